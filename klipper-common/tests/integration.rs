//! Integration tests for klipper-common.

use std::io::Write;

use klipper_common::moonraker::{ApiResponse, DirectoryInfo, SystemInfo};
use klipper_common::{LogFormat, LogLevel, LoggingConfig, load_config};

#[test]
fn test_load_logging_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        r#"{{
            // comments are allowed in JSON5
            level: "Warning",
            format: "json",
        }}"#
    )
    .unwrap();

    let config: LoggingConfig = load_config(file.path()).expect("load config");

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.parsed_level().unwrap(), LogLevel::Warn);
}

#[test]
fn test_load_missing_config_file() {
    let result: klipper_common::Result<LoggingConfig> =
        load_config("/nonexistent/klipper-exporter.json5");

    let err = result.unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_decode_moonraker_payloads() {
    let directory = r#"{
        "result": {
            "dirs": [],
            "files": [{"filename": "cube.gcode", "size": 1024}],
            "disk_usage": {"total": 1000, "used": 250, "free": 750},
            "root_info": {"name": "gcodes", "permissions": "rw"}
        }
    }"#;
    let directory: ApiResponse<DirectoryInfo> = serde_json::from_str(directory).unwrap();
    assert_eq!(directory.result.disk_usage.free, 750);

    let system = r#"{
        "result": {
            "system_info": {
                "cpu_info": {"cpu_count": 4, "bits": "64bit", "processor": "aarch64"},
                "distribution": {"name": "Debian"}
            }
        }
    }"#;
    let system: ApiResponse<SystemInfo> = serde_json::from_str(system).unwrap();
    assert_eq!(system.result.system_info.cpu_info.cpu_count, 4);
}
