use serde::Serialize;

use readmit_core::config::{AppConfig, LoadOptions, OracleProvider};
use readmit_core::schema;

use super::block_on;

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
    let mut checks = vec![check_schema_integrity()];

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_oracle_readiness(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "oracle_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
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

fn check_schema_integrity() -> DoctorCheck {
    let count = schema::REQUIRED_FIELDS.len();
    let unique: std::collections::HashSet<&str> = schema::field_names().collect();

    if unique.len() == count {
        DoctorCheck {
            name: "schema_integrity",
            status: CheckStatus::Pass,
            details: format!("{count} required fields, no duplicates"),
        }
    } else {
        DoctorCheck {
            name: "schema_integrity",
            status: CheckStatus::Fail,
            details: format!("{count} fields but only {} unique names", unique.len()),
        }
    }
}

fn check_oracle_readiness(config: &AppConfig) -> DoctorCheck {
    match config.oracle.provider {
        OracleProvider::Builtin => DoctorCheck {
            name: "oracle_readiness",
            status: CheckStatus::Pass,
            details: "builtin oracle is in-process and always ready".to_string(),
        },
        OracleProvider::Http => check_remote_oracle(config),
    }
}

fn check_remote_oracle(config: &AppConfig) -> DoctorCheck {
    let Some(base_url) = config.oracle.base_url.as_deref() else {
        return DoctorCheck {
            name: "oracle_readiness",
            status: CheckStatus::Fail,
            details: "oracle.base_url is not configured".to_string(),
        };
    };

    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let timeout = std::time::Duration::from_secs(config.oracle.timeout_secs);
    let probe = async {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| error.to_string())?;
        let response = client.get(&url).send().await.map_err(|error| error.to_string())?;
        if response.status().is_success() {
            Ok::<(), String>(())
        } else {
            Err(format!("prediction service returned {}", response.status()))
        }
    };

    match block_on(probe) {
        Ok(Ok(())) => DoctorCheck {
            name: "oracle_readiness",
            status: CheckStatus::Pass,
            details: format!("reached `{url}`"),
        },
        Ok(Err(details)) => {
            DoctorCheck { name: "oracle_readiness", status: CheckStatus::Fail, details }
        }
        Err(details) => {
            DoctorCheck { name: "oracle_readiness", status: CheckStatus::Fail, details }
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
