use serde_json::{Map, Value, json};

use crate::engine::Runtime;
use crate::form::{OptionView, QuestionView};
use crate::survey::QuestionKind;

/// Progress labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A visible question is empty or flagged.
    NeedInput,
    /// Every visible question carries a valid answer.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
        }
    }
}

fn kind_label(kind: QuestionKind) -> &'static str {
    match kind {
        QuestionKind::Builtin => "builtin",
        QuestionKind::Text => "text",
        QuestionKind::SingleChoice => "single-choice",
        QuestionKind::MultipleChoice => "multiple-choice",
    }
}

fn is_answered(runtime: &Runtime, question: &QuestionView) -> bool {
    if question.kind.has_field() {
        !question.value.is_empty()
    } else {
        runtime.form().any_checked(question.id)
    }
}

fn open_answer_error(runtime: &Runtime, question: &QuestionView) -> bool {
    question
        .options
        .iter()
        .filter_map(|id| runtime.form().open_answer(*id))
        .any(|open| open.enabled && open.error)
}

/// Visible questions that still need attention, in declaration order.
fn pending(runtime: &Runtime) -> Vec<&QuestionView> {
    runtime
        .form()
        .questions()
        .filter(|question| question.visible() && question.kind != QuestionKind::Builtin)
        .filter(|question| {
            question.error
                || open_answer_error(runtime, question)
                || (question.mandatory && !is_answered(runtime, question))
        })
        .collect()
}

pub fn status(runtime: &Runtime) -> RenderStatus {
    if pending(runtime).is_empty() {
        RenderStatus::Complete
    } else {
        RenderStatus::NeedInput
    }
}

fn option_json(option: &OptionView) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), json!(option.id));
    map.insert("value".into(), Value::String(option.value.clone()));
    map.insert("checked".into(), Value::Bool(option.checked));
    map.insert("visible".into(), Value::Bool(option.visible()));
    if option.derived {
        map.insert("derived".into(), Value::Bool(true));
    }
    if let Some(open) = &option.open {
        map.insert(
            "open".into(),
            json!({
                "value": open.value,
                "enabled": open.enabled,
                "error": open.error,
                "classes": open.binding.classes,
            }),
        );
    }
    Value::Object(map)
}

/// Machine-readable snapshot of the form and its rule targets.
pub fn render_json(runtime: &Runtime) -> Value {
    let form = runtime.form();
    let questions = form
        .questions()
        .map(|question| {
            let mut map = Map::new();
            map.insert("id".into(), json!(question.id));
            map.insert(
                "type".into(),
                Value::String(kind_label(question.kind).to_string()),
            );
            map.insert("mandatory".into(), Value::Bool(question.mandatory));
            map.insert("visible".into(), Value::Bool(question.visible()));
            map.insert("error".into(), Value::Bool(question.error));
            if question.kind.has_field() {
                map.insert("value".into(), Value::String(question.value.clone()));
                map.insert("classes".into(), json!(question.binding.classes));
            }
            let options = question
                .options
                .iter()
                .filter_map(|id| form.option(*id))
                .map(option_json)
                .collect::<Vec<_>>();
            if !options.is_empty() {
                map.insert("options".into(), Value::Array(options));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    let targets = runtime
        .catalog()
        .targets()
        .map(|target| {
            json!({
                "signature": target.signature.to_string(),
                "visible": target.state.visible(),
                "state": target.state,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "status": status(runtime).as_str(),
        "timestamp": form.timestamp(),
        "questions": questions,
        "targets": targets,
        "submission": runtime.submission(),
    })
}

/// Human-friendly summary of the form.
pub fn render_text(runtime: &Runtime) -> String {
    let form = runtime.form();
    let mut lines = Vec::new();
    let pending = pending(runtime);
    lines.push(format!(
        "Status: {} ({} pending)",
        status(runtime).as_str(),
        pending.len()
    ));
    if let Some(timestamp) = form.timestamp() {
        lines.push(format!("Timestamp: {}", timestamp));
    }

    lines.push("Visible questions:".to_string());
    for question in form.questions().filter(|question| question.visible()) {
        let mut entry = format!(" - {} [{}]", question.id, kind_label(question.kind));
        if question.mandatory {
            entry.push_str(" [mandatory]");
        }
        if question.error {
            entry.push_str(" [error]");
        }
        if question.kind.has_field() && !question.value.is_empty() {
            entry.push_str(&format!(" = {}", question.value));
        }
        lines.push(entry);

        for option in question
            .options
            .iter()
            .filter_map(|id| form.option(*id))
            .filter(|option| option.visible())
        {
            let mark = if option.checked { "x" } else { " " };
            let mut entry = format!("     [{}] {} {}", mark, option.id, option.value);
            if option.derived {
                entry.push_str(" (derived)");
            }
            if let Some(open) = &option.open
                && open.enabled
                && !open.value.is_empty()
            {
                entry.push_str(&format!(": {}", open.value));
                if open.error {
                    entry.push_str(" [error]");
                }
            }
            lines.push(entry);
        }
    }

    let hidden = form
        .questions()
        .filter(|question| !question.visible())
        .map(|question| question.id.to_string())
        .collect::<Vec<_>>();
    if !hidden.is_empty() {
        lines.push(format!("Hidden questions: {}", hidden.join(", ")));
    }

    lines.join("\n")
}
