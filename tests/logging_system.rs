use chrono::Datelike;
use std::fs;
use std::path::{Path, PathBuf};
use vidmap::logging::{LoggingConfig, build_current_log_path, init, run_log_maintenance};

// 注意: 由于 tracing 的全局订阅器只能初始化一次,
// 涉及 init() 的测试必须单独运行或使用 #[ignore] 标记

fn test_config(dir: &Path, prefix: &str, level: &str) -> LoggingConfig {
    LoggingConfig {
        level: level.to_string(),
        directory: dir.to_string_lossy().to_string(),
        file_prefix: prefix.to_string(),
        retention_days: 7,
        compress_history: false,
        console: false,
    }
}

/// 获取当前日期的日志文件路径
fn get_today_log_path(dir: &Path, prefix: &str) -> PathBuf {
    build_current_log_path(dir, prefix, chrono::Local::now().date_naive())
}

#[test]
#[ignore] // 需要单独运行: cargo test --test logging_system test_logging_file_content -- --ignored
fn test_logging_file_content() {
    let temp_dir = tempfile::tempdir().expect("创建临时目录失败");
    let log_dir = temp_dir.path().join("nested").join("logs");
    init(test_config(&log_dir, "content-test", "info")).expect("日志初始化失败");
    assert!(log_dir.exists(), "嵌套日志目录应该被创建");

    tracing::error!("错误日志_ERROR_MSG");
    tracing::warn!("文件打开失败: 路径={}", "/测试/路径.mp4");
    tracing::info!("信息日志_INFO_MSG");
    tracing::debug!("调试日志_DEBUG_MSG"); // 应该被过滤掉
    // 库 crate 的 log 记录经桥接写入同一文件
    let mut file = vidmap::format::MediaFile::from_bytes("blob.bin", vec![0x12; 64])
        .expect("创建媒体文件失败");
    assert!(file.parse().is_err());

    std::thread::sleep(std::time::Duration::from_millis(200));

    let log_file = get_today_log_path(&log_dir, "content-test");
    let content = fs::read_to_string(&log_file)
        .unwrap_or_else(|e| panic!("读取日志文件失败: {:?}, 错误: {}", log_file, e));

    assert!(content.contains("错误日志_ERROR_MSG"), "应该包含错误日志");
    assert!(content.contains("文件打开失败"), "应该包含中文警告");
    assert!(content.contains("信息日志_INFO_MSG"), "应该包含信息日志");
    assert!(content.contains("INFO"), "日志应该包含 INFO 级别标记");
    assert!(
        !content.contains("调试日志_DEBUG_MSG"),
        "debug 日志应该被过滤掉"
    );

    // 重复初始化返回错误
    assert!(init(test_config(&log_dir, "content-test", "info")).is_err());
}

#[test]
fn test_logging_file_naming_format() {
    let dir = Path::new("logs");
    for prefix in ["vidmap", "vidmap-probe", "vidmap-index"] {
        let today = chrono::Local::now().date_naive();
        let path = build_current_log_path(dir, prefix, today);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        assert!(file_name.starts_with(prefix), "文件名应该以前缀 {} 开头", prefix);
        assert!(file_name.ends_with(".log"), "文件名应该以 .log 结尾");
        assert!(
            file_name.contains(&today.year().to_string()),
            "文件名应该包含年份"
        );
    }
}

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();
    assert_eq!(config.level, "info");
    assert_eq!(config.directory, "logs");
    assert_eq!(config.file_prefix, "vidmap");
    assert_eq!(config.retention_days, 30, "默认保留天数应该是 30");
    assert!(config.compress_history, "默认应该开启压缩");
    assert!(config.console);
}

#[test]
fn test_logging_maintenance_keeps_today() {
    let temp_dir = tempfile::tempdir().expect("创建临时目录失败");
    let config = LoggingConfig {
        compress_history: true,
        ..test_config(temp_dir.path(), "vidmap", "info")
    };

    let today_log = get_today_log_path(temp_dir.path(), "vidmap");
    fs::write(&today_log, "今天的日志").unwrap();
    fs::write(temp_dir.path().join("vidmap.2000-01-01.log"), "过期").unwrap();

    let report = run_log_maintenance(&config).expect("日志维护失败");
    assert_eq!(report.removed, 1);
    assert_eq!(report.compressed, 0);
    assert!(today_log.exists(), "当天日志不应被压缩或删除");
    assert!(!temp_dir.path().join("vidmap.2000-01-01.log").exists());
}
