use claimdesk_core::config::{AppConfig, LoadOptions};
use claimdesk_core::workflow::WorkflowTable;
use claimdesk_db::connect_with_settings;
use claimdesk_db::repositories::{SqlWorkflowConfigRepository, WorkflowConfigRepository};
use serde::Serialize;

use crate::commands::CommandResult;

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

/// Exit code is 0 when every check passes and 1 otherwise.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
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
            checks.push(check_email_delivery(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["email_delivery", "database_connectivity", "workflow_stages"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_email_delivery(config: &AppConfig) -> DoctorCheck {
    let details = match (config.email.enabled, config.email.endpoint.as_deref()) {
        (false, _) => {
            "email delivery disabled; outbox rows are marked sent without sending".to_string()
        }
        (true, Some(endpoint)) => format!("outbox delivers through `{endpoint}`"),
        (true, None) => {
            return DoctorCheck {
                name: "email_delivery",
                status: CheckStatus::Fail,
                details: "email.enabled is true but no endpoint is configured".to_string(),
            }
        }
    };
    DoctorCheck { name: "email_delivery", status: CheckStatus::Pass, details }
}

/// Connectivity first; the stage check only runs against a reachable database.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                DoctorCheck {
                    name: "workflow_stages",
                    status: CheckStatus::Skipped,
                    details: "skipped because the runtime did not start".to_string(),
                },
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "workflow_stages",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };

        let stages = match SqlWorkflowConfigRepository::new(pool.clone()).list_stages().await {
            Ok(stages) => match WorkflowTable::from_stages(&stages) {
                Ok(_) if stages.is_empty() => DoctorCheck {
                    name: "workflow_stages",
                    status: CheckStatus::Pass,
                    details: "no stages configured; built-in approval chains apply".to_string(),
                },
                Ok(_) => DoctorCheck {
                    name: "workflow_stages",
                    status: CheckStatus::Pass,
                    details: format!("{} workflow stages configured", stages.len()),
                },
                Err(error) => DoctorCheck {
                    name: "workflow_stages",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                },
            },
            Err(error) => DoctorCheck {
                name: "workflow_stages",
                status: CheckStatus::Fail,
                details: format!("stages unreadable (run `claimdesk migrate`?): {error}"),
            },
        };

        pool.close().await;
        vec![connectivity, stages]
    })
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
