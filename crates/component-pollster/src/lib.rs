use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use pollster_core::{
    Change, DispatchReport, PriorAnswers, Runtime, RuntimeError, SurveySpec, check_survey,
    render_json as core_render_json, render_text as core_render_text,
};

const DEFAULT_SURVEY: &str = include_str!("../fixtures/default_survey.json");

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("survey '{0}' is not available")]
    SurveyUnavailable(String),
    #[error("failed to parse {what}: {source}")]
    InputParse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    survey_json: Option<String>,
}

fn load_survey(config_json: &str) -> Result<SurveySpec, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    let survey_json = config.survey_json.as_deref().unwrap_or(DEFAULT_SURVEY);

    serde_json::from_str(survey_json).map_err(ComponentError::ConfigParse)
}

fn ensure_survey(survey_id: &str, config_json: &str) -> Result<SurveySpec, ComponentError> {
    let survey = load_survey(config_json)?;
    if survey.id != survey_id {
        Err(ComponentError::SurveyUnavailable(survey_id.to_string()))
    } else {
        Ok(survey)
    }
}

/// Blank input means "no previous participation".
fn parse_prior(prior_json: &str) -> Result<Option<PriorAnswers>, ComponentError> {
    if prior_json.trim().is_empty() {
        return Ok(None);
    }
    let prior: PriorAnswers =
        serde_json::from_str(prior_json).map_err(|source| ComponentError::InputParse {
            what: "prior answers",
            source,
        })?;
    Ok((!prior.is_empty()).then_some(prior))
}

fn parse_changes(changes_json: &str) -> Result<Vec<Change>, ComponentError> {
    if changes_json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(changes_json).map_err(|source| ComponentError::InputParse {
        what: "changes",
        source,
    })
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

/// Starts a runtime and replays `changes` against it.
pub fn replay(
    survey: &SurveySpec,
    prior: Option<PriorAnswers>,
    changes: &[Change],
) -> Result<(Runtime, Vec<DispatchReport>), ComponentError> {
    let mut runtime = Runtime::new(survey, prior)?;
    let mut reports = Vec::with_capacity(changes.len());
    for change in changes {
        reports.push(runtime.apply_change(change)?);
    }
    tracing::debug!(survey = %survey.id, changes = changes.len(), "changes replayed");
    Ok((runtime, reports))
}

fn replay_json(
    survey_id: &str,
    config_json: &str,
    prior_json: &str,
    changes_json: &str,
) -> Result<(Runtime, Vec<DispatchReport>), ComponentError> {
    let survey = ensure_survey(survey_id, config_json)?;
    let prior = parse_prior(prior_json)?;
    let changes = parse_changes(changes_json)?;
    replay(&survey, prior, &changes)
}

pub fn describe(survey_id: &str, config_json: &str) -> String {
    respond(
        ensure_survey(survey_id, config_json)
            .and_then(|survey| serde_json::to_value(survey).map_err(ComponentError::JsonEncode)),
    )
}

pub fn check(survey_id: &str, config_json: &str) -> String {
    respond(ensure_survey(survey_id, config_json).and_then(|survey| {
        serde_json::to_value(check_survey(&survey)).map_err(ComponentError::JsonEncode)
    }))
}

pub fn catalog(survey_id: &str, config_json: &str, prior_json: &str) -> String {
    respond(replay_json(survey_id, config_json, prior_json, "").and_then(|(runtime, _)| {
        serde_json::to_value(runtime.catalog().summary()).map_err(ComponentError::JsonEncode)
    }))
}

pub fn start(survey_id: &str, config_json: &str, prior_json: &str) -> String {
    respond(
        replay_json(survey_id, config_json, prior_json, "")
            .map(|(runtime, _)| core_render_json(&runtime)),
    )
}

pub fn simulate(survey_id: &str, config_json: &str, prior_json: &str, changes_json: &str) -> String {
    respond(
        replay_json(survey_id, config_json, prior_json, changes_json).and_then(
            |(runtime, reports)| {
                let reports = serde_json::to_value(reports).map_err(ComponentError::JsonEncode)?;
                Ok(json!({
                    "state": core_render_json(&runtime),
                    "reports": reports,
                }))
            },
        ),
    )
}

pub fn submit(survey_id: &str, config_json: &str, prior_json: &str, changes_json: &str) -> String {
    respond(
        replay_json(survey_id, config_json, prior_json, changes_json).and_then(
            |(runtime, _)| {
                serde_json::to_value(runtime.submission()).map_err(ComponentError::JsonEncode)
            },
        ),
    )
}

pub fn render_text(
    survey_id: &str,
    config_json: &str,
    prior_json: &str,
    changes_json: &str,
) -> String {
    respond_string(
        replay_json(survey_id, config_json, prior_json, changes_json)
            .map(|(runtime, _)| core_render_text(&runtime)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describe_returns_survey_json() {
        let payload = describe("health", "");
        let survey: Value = serde_json::from_str(&payload).expect("valid json");
        assert_eq!(survey["id"], "health");
        assert_eq!(survey["questions"][1]["type"], "single-choice");
    }

    #[test]
    fn unknown_survey_is_reported() {
        let payload = describe("other", "");
        let parsed: Value = serde_json::from_str(&payload).expect("json");
        assert_eq!(parsed["error"], "survey 'other' is not available");
    }

    #[test]
    fn check_reports_valid_default_survey() {
        let parsed: Value = serde_json::from_str(&check("health", "")).expect("json");
        assert_eq!(parsed["valid"], true);
    }

    #[test]
    fn catalog_lists_synthesized_rules() {
        let parsed: Value = serde_json::from_str(&catalog("health", "", "")).expect("json");
        let questions = parsed["questions"].as_array().expect("questions");
        assert_eq!(questions.len(), 6);
        for question in questions {
            let rules = question["rules"].as_array().expect("rules");
            assert_eq!(rules.last().expect("rule")["synthesized"], true);
        }
    }

    #[test]
    fn start_hides_gated_questions() {
        let parsed: Value = serde_json::from_str(&start("health", "", "")).expect("json");
        assert_eq!(parsed["status"], "need_input");
        let visible: Vec<bool> = parsed["questions"]
            .as_array()
            .expect("questions")
            .iter()
            .map(|question| question["visible"].as_bool().unwrap_or(false))
            .collect();
        assert_eq!(visible, vec![true, true, false, false, false, true]);
    }

    #[test]
    fn simulate_replays_changes() {
        let changes = json!([
            { "action": "check", "option": 20 },
            { "action": "check", "option": 30 },
            { "action": "set_value", "question": 4, "value": "39.2" }
        ]);
        let parsed: Value =
            serde_json::from_str(&simulate("health", "", "", &changes.to_string())).expect("json");
        let reports = parsed["reports"].as_array().expect("reports");
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2]["events"][1]["input"]["kind"], "option");
        assert_eq!(reports[2]["events"][1]["input"]["id"], 40);
        assert_eq!(reports[2]["events"][1]["synthetic"], true);
        assert_eq!(parsed["state"]["questions"][4]["visible"], true);
    }

    #[test]
    fn submit_returns_enabled_answers() {
        let prior = json!({ "timestamp": "2026-10-01T08:30:00" });
        let changes = json!([
            { "action": "check", "option": 21 },
            { "action": "set_value", "question": 6, "value": "75001" }
        ]);
        let parsed: Value = serde_json::from_str(&submit(
            "health",
            "",
            &prior.to_string(),
            &changes.to_string(),
        ))
        .expect("json");
        assert_eq!(parsed["timestamp"], "2026-10-01T08:30:00");
        assert_eq!(parsed["checked"], json!([21]));
        assert_eq!(parsed["values"]["6"], "75001");
        assert_eq!(parsed["values"]["1"], "2026-10-01T08:30:00");
    }

    #[test]
    fn custom_survey_from_config() {
        let survey = json!({
            "id": "tiny",
            "title": "Tiny",
            "version": "1",
            "questions": [
                { "id": 1, "type": "text", "title": "Name", "mandatory": true }
            ]
        });
        let config = json!({ "survey_json": survey.to_string() });
        let changes = json!([{ "action": "set_value", "question": 1, "value": "" }]);
        let output = render_text("tiny", &config.to_string(), "", &changes.to_string());
        assert!(output.contains("Status: need_input"));
        assert!(output.contains("[error]"));
    }

    #[test]
    fn malformed_changes_are_errors() {
        let parsed: Value =
            serde_json::from_str(&simulate("health", "", "", "[{\"action\":\"jump\"}]"))
                .expect("json");
        assert!(
            parsed["error"]
                .as_str()
                .unwrap_or_default()
                .starts_with("failed to parse changes")
        );
    }

    #[test]
    fn bundled_default_survey_is_clean() {
        let survey: SurveySpec = serde_json::from_str(DEFAULT_SURVEY).expect("bundled survey");
        assert_eq!(survey.id, "health");
        assert!(check_survey(&survey).valid);
        assert!(Runtime::new(&survey, None).is_ok());
    }
}
