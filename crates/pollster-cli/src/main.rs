mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use component_pollster::replay;
use logging::{LogConfig, init_logging};
use pollster_core::{
    Change, CheckReport, PriorAnswers, SurveySpec, check_survey, render_json, render_text,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Survey rule checker and simulator",
    long_about = "Lints survey definitions, prints their rule catalog and replays form changes through the rule propagation engine"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). Logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Lint a survey definition.
    Check {
        /// Path to the survey JSON.
        #[arg(long, value_name = "SURVEY")]
        survey: PathBuf,
    },
    /// Print the rule catalog built from a survey, synthesized rules included.
    Catalog {
        /// Path to the survey JSON.
        #[arg(long, value_name = "SURVEY")]
        survey: PathBuf,
        /// Optional JSON file with answers from a previous participation.
        #[arg(long, value_name = "PRIOR")]
        prior: Option<PathBuf>,
    },
    /// Start a runtime and replay a list of changes through it.
    Simulate {
        /// Path to the survey JSON.
        #[arg(long, value_name = "SURVEY")]
        survey: PathBuf,
        /// Optional JSON file with answers from a previous participation.
        #[arg(long, value_name = "PRIOR")]
        prior: Option<PathBuf>,
        /// Optional JSON array of changes (set_value, check, uncheck, set_open_answer).
        #[arg(long, value_name = "CHANGES")]
        changes: Option<PathBuf>,
        /// Output format for the final form state.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the JSON schema of survey definitions.
    Schema,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose).with_ansi(io::stderr().is_terminal()));
    match cli.command {
        Command::Check { survey } => run_check(&survey),
        Command::Catalog { survey, prior } => run_catalog(&survey, prior.as_deref()),
        Command::Simulate {
            survey,
            prior,
            changes,
            format,
        } => run_simulate(&survey, prior.as_deref(), changes.as_deref(), format),
        Command::Schema => run_schema(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    let value = serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse {}: {}", path.display(), err))?;
    Ok(value)
}

fn load_survey(path: &Path) -> CliResult<SurveySpec> {
    let survey: SurveySpec = read_json(path)?;
    tracing::info!(survey = %survey.id, questions = survey.questions.len(), "survey loaded");
    Ok(survey)
}

fn load_prior(path: Option<&Path>) -> CliResult<Option<PriorAnswers>> {
    path.map(read_json::<PriorAnswers>).transpose()
}

fn run_check(survey_path: &Path) -> CliResult<()> {
    let survey = load_survey(survey_path)?;
    let report = check_survey(&survey);
    println!(
        "Check result: {}",
        if report.valid { "valid" } else { "invalid" }
    );
    describe_check(&report);

    if report.valid {
        Ok(())
    } else {
        Err("survey check failed".into())
    }
}

fn describe_check(report: &CheckReport) {
    for (label, issues) in [("Errors", &report.errors), ("Warnings", &report.warnings)] {
        if issues.is_empty() {
            continue;
        }
        println!("{}:", label);
        for issue in issues {
            println!(
                "  {} - {} ({})",
                issue.path.as_deref().unwrap_or("<survey>"),
                issue.message,
                issue.code
            );
        }
    }
}

fn run_catalog(survey_path: &Path, prior_path: Option<&Path>) -> CliResult<()> {
    let survey = load_survey(survey_path)?;
    let prior = load_prior(prior_path)?;
    let (runtime, _) = replay(&survey, prior, &[])?;
    println!(
        "{}",
        serde_json::to_string_pretty(&runtime.catalog().summary())?
    );
    Ok(())
}

fn run_simulate(
    survey_path: &Path,
    prior_path: Option<&Path>,
    changes_path: Option<&Path>,
    format: OutputFormat,
) -> CliResult<()> {
    let survey = load_survey(survey_path)?;
    let prior = load_prior(prior_path)?;
    let changes: Vec<Change> = match changes_path {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let (runtime, reports) = replay(&survey, prior, &changes)?;

    match format {
        OutputFormat::Text => {
            println!("{}", render_text(&runtime));
            let synthetic: usize = reports
                .iter()
                .flat_map(|report| report.events.iter())
                .filter(|event| event.synthetic)
                .count();
            println!(
                "Replayed {} changes ({} synthetic events).",
                changes.len(),
                synthetic
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "state": render_json(&runtime),
                "reports": reports,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn run_schema() -> CliResult<()> {
    let schema = schemars::schema_for!(SurveySpec);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use assert_fs::prelude::*;
    use serde_json::{Value, json};

    const HEALTH_SURVEY: &str =
        include_str!("../../pollster-core/tests/fixtures/health_survey.json");

    fn workspace() -> assert_fs::TempDir {
        let dir = assert_fs::TempDir::new().expect("temp dir");
        dir.child("survey.json")
            .write_str(HEALTH_SURVEY)
            .expect("write survey");
        dir
    }

    #[test]
    fn check_accepts_fixture() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace();
        let output = Command::cargo_bin("pollster")?
            .arg("check")
            .arg("--survey")
            .arg(dir.child("survey.json").path())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert!(String::from_utf8(output)?.contains("Check result: valid"));
        Ok(())
    }

    #[test]
    fn check_fails_on_invalid_survey() -> Result<(), Box<dyn std::error::Error>> {
        let dir = assert_fs::TempDir::new()?;
        let survey = dir.child("broken.json");
        survey.write_str(
            &json!({
                "id": "broken",
                "title": "Broken",
                "version": "1",
                "questions": [
                    { "id": 1, "type": "multiple-choice", "title": "Q", "options": [
                        { "id": 10, "value": "not valid" }
                    ]}
                ]
            })
            .to_string(),
        )?;
        let output = Command::cargo_bin("pollster")?
            .arg("check")
            .arg("--survey")
            .arg(survey.path())
            .assert()
            .failure()
            .get_output()
            .stdout
            .clone();
        assert!(String::from_utf8(output)?.contains("invalid_value"));
        Ok(())
    }

    #[test]
    fn simulate_emits_json_state() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace();
        let changes = dir.child("changes.json");
        changes.write_str(
            &json!([
                { "action": "check", "option": 20 },
                { "action": "check", "option": 30 }
            ])
            .to_string(),
        )?;
        let output = Command::cargo_bin("pollster")?
            .args(["simulate", "--format", "json", "--survey"])
            .arg(dir.child("survey.json").path())
            .arg("--changes")
            .arg(changes.path())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: Value = serde_json::from_slice(&output)?;
        assert_eq!(parsed["reports"].as_array().map(Vec::len), Some(2));
        assert_eq!(parsed["state"]["questions"][2]["visible"], true);
        assert_eq!(parsed["state"]["questions"][3]["visible"], true);
        Ok(())
    }

    #[test]
    fn simulate_text_uses_prior_answers() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace();
        let prior = dir.child("prior.json");
        prior.write_str(r#"{"timestamp":"2026-10-01T08:30:00","checked":[20]}"#)?;
        let output = Command::cargo_bin("pollster")?
            .arg("simulate")
            .arg("--survey")
            .arg(dir.child("survey.json").path())
            .arg("--prior")
            .arg(prior.path())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let text = String::from_utf8(output)?;
        assert!(text.contains("Timestamp: 2026-10-01T08:30:00"));
        assert!(text.contains(" - question-3 [multiple-choice]"));
        assert!(text.contains("Replayed 0 changes"));
        Ok(())
    }

    #[test]
    fn catalog_prints_targets() -> Result<(), Box<dyn std::error::Error>> {
        let dir = workspace();
        let output = Command::cargo_bin("pollster")?
            .arg("catalog")
            .arg("--survey")
            .arg(dir.child("survey.json").path())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let parsed: Value = serde_json::from_slice(&output)?;
        let signatures: Vec<&str> = parsed["targets"]
            .as_array()
            .expect("targets")
            .iter()
            .filter_map(|target| target["signature"].as_str())
            .collect();
        assert_eq!(
            signatures,
            vec!["question-3", "question-4", "question-5", "options-52"]
        );
        Ok(())
    }

    #[test]
    fn schema_describes_surveys() -> Result<(), Box<dyn std::error::Error>> {
        let output = Command::cargo_bin("pollster")?
            .arg("schema")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let schema: Value = serde_json::from_slice(&output)?;
        assert_eq!(schema["title"], "SurveySpec");
        Ok(())
    }

    #[test]
    fn missing_survey_file_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        Command::cargo_bin("pollster")?
            .arg("check")
            .arg("--survey")
            .arg(dir.path().join("absent.json"))
            .assert()
            .failure();
        Ok(())
    }
}
