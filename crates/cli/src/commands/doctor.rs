use serde::Serialize;

use tradepost_core::config::{AppConfig, LlmProvider, LoadOptions};
use tradepost_db::connect_with_settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "llm_credential_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    finalize(checks)
}

fn finalize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

// Credential presence is enforced by config validation, so a loaded
// config implies the provider-specific requirement is already met.
fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let details = match config.llm.provider {
        LlmProvider::OpenAi => "openai api key present (validated by config contract)",
        LlmProvider::Anthropic => "anthropic api key present (validated by config contract)",
        LlmProvider::Ollama => "ollama base url present (validated by config contract)",
    };

    DoctorCheck {
        name: "llm_credential_readiness",
        status: CheckStatus::Pass,
        details: details.to_string(),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{finalize, render_human, CheckStatus, DoctorCheck};

    fn check(name: &'static str, status: CheckStatus) -> DoctorCheck {
        DoctorCheck { name, status, details: "details".to_string() }
    }

    #[test]
    fn a_single_failed_check_fails_the_report() {
        let report = finalize(vec![
            check("config_validation", CheckStatus::Pass),
            check("database_connectivity", CheckStatus::Fail),
        ]);

        assert_eq!(report.overall_status, CheckStatus::Fail);
        assert!(report.summary.contains("failed"));
    }

    #[test]
    fn skipped_checks_also_fail_the_report() {
        let report = finalize(vec![
            check("config_validation", CheckStatus::Fail),
            check("database_connectivity", CheckStatus::Skipped),
        ]);

        assert_eq!(report.overall_status, CheckStatus::Fail);
    }

    #[test]
    fn human_rendering_marks_each_status() {
        let report = finalize(vec![
            check("config_validation", CheckStatus::Pass),
            check("llm_credential_readiness", CheckStatus::Skipped),
        ]);

        let rendered = render_human(&report);
        assert!(rendered.contains("- [ok] config_validation"));
        assert!(rendered.contains("- [skip] llm_credential_readiness"));
    }
}
