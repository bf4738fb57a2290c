use std::env;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

use readmit_cli::commands::{batch, config, doctor, predict};
use serde_json::{json, Value};

fn valid_record() -> Value {
    json!({
        "race": "Caucasian",
        "gender": "Female",
        "time_in_hospital": "4",
        "num_lab_procedures": "43",
        "num_procedures": "1",
        "num_medications": "16",
        "number_outpatient": "0",
        "number_emergency": "0",
        "number_inpatient": "0",
        "numchange": "0",
        "service_utilization": "1",
        "is_emergency_admission": "1",
        "admission_category": "emergency",
        "discharge_to_home": "1",
        "discharge_care_level": "home",
        "admitted_from_emergency": "1",
        "age_midpoint": "65",
        "diag_1_range": "390-459 (Circulatory)",
        "diag_2_range": "240-279 (Endocrine/Metabolic)",
        "diag_3_range": "Other",
        "A1Cresult": "1",
        "max_glu_serum": "0",
        "diabetesMed": "Yes",
        "Cluster": "2"
    })
}

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write fixture");
    file
}

#[test]
fn predict_returns_success_with_valid_record() {
    with_env(&[], || {
        let file = write_temp(&valid_record().to_string());
        let result = predict::run(Some(file.path()));
        assert_eq!(result.exit_code, 0, "expected successful prediction");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "predict");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("prediction: "));
        assert!(message.contains("probability"));
    });
}

#[test]
fn predict_rejects_out_of_domain_value() {
    with_env(&[], || {
        let mut record = valid_record();
        record["time_in_hospital"] = json!("99");
        let file = write_temp(&record.to_string());

        let result = predict::run(Some(file.path()));
        assert_eq!(result.exit_code, 4, "expected prediction rejection code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "prediction");
    });
}

#[test]
fn predict_rejects_malformed_json() {
    with_env(&[], || {
        let file = write_temp("this is not json");
        let result = predict::run(Some(file.path()));
        assert_eq!(result.exit_code, 3, "expected invalid input code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn batch_appends_both_prediction_columns() {
    with_env(&[], || {
        let rows = json!([valid_record(), valid_record()]);
        let file = write_temp(&rows.to_string());

        let result = batch::run(Some(file.path()));
        assert_eq!(result.exit_code, 0, "expected successful batch scoring");

        let table: Value = serde_json::from_str(&result.output).expect("scored table JSON");
        let rows = table.as_array().expect("array of rows");
        assert_eq!(rows.len(), 2);
        for row in rows {
            let label = row["Readmission Prediction"].as_i64().expect("label column");
            assert!(label == 0 || label == 1);
            let probability = row["Readmission Probability"].as_f64().expect("probability column");
            assert!((0.0..=1.0).contains(&probability));
        }
    });
}

#[test]
fn batch_reports_missing_columns_precisely() {
    with_env(&[], || {
        let mut record = valid_record();
        record.as_object_mut().expect("object").remove("race");
        let file = write_temp(&json!([record]).to_string());

        let result = batch::run(Some(file.path()));
        assert_eq!(result.exit_code, 4, "expected batch rejection code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "prediction");
        assert!(payload["message"].as_str().unwrap_or("").contains("race"));
    });
}

#[test]
fn doctor_passes_with_builtin_defaults() {
    with_env(&[], || {
        let output = doctor::run(true);
        let report: Value = serde_json::from_str(&output).expect("doctor JSON report");

        assert_eq!(report["overall_status"], "pass");
        let checks = report["checks"].as_array().expect("checks array");
        assert!(checks.iter().any(|check| check["name"] == "schema_integrity"));
        assert!(checks.iter().any(|check| check["name"] == "oracle_readiness"));
    });
}

#[test]
fn config_reports_default_sources_with_clean_env() {
    with_env(&[], || {
        let output = config::run();
        assert!(output.contains("- oracle.provider = builtin (source: default)"));
        assert!(output.contains("- oracle.api_key = <unset> (source: default)"));
        assert!(output.contains("- server.port = 8080 (source: default)"));
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("READMIT_LOGGING_LEVEL", "debug")], || {
        let output = config::run();
        assert!(output.contains("- logging.level = debug (source: env (READMIT_LOGGING_LEVEL))"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "READMIT_ORACLE_PROVIDER",
        "READMIT_ORACLE_BASE_URL",
        "READMIT_ORACLE_API_KEY",
        "READMIT_ORACLE_TIMEOUT_SECS",
        "READMIT_ORACLE_MAX_RETRIES",
        "READMIT_SERVER_BIND_ADDRESS",
        "READMIT_SERVER_PORT",
        "READMIT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "READMIT_LOGGING_LEVEL",
        "READMIT_LOGGING_FORMAT",
        "READMIT_LOG_LEVEL",
        "READMIT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
