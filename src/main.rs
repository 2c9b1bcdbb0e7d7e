// ==========================================
// 发运导入与对账引擎 - 命令行入口
// ==========================================
// 用法: shipping-import <file> [db_path] [imported_by]
// - file: Excel 文件，或含 PO.csv / Cartons.csv 的目录
// - db_path: SQLite 文件（默认: 用户数据目录，或 SHIPPING_IMPORT_DB_PATH）
// 输出: stdout 打印 JSON；导入被拒绝或中断时以非零码退出
// ==========================================

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use shipping_import::{logging, ShippingApi};

const DB_FILE_NAME: &str = "shipping_import.db";

/// 默认数据库路径
fn default_db_path() -> anyhow::Result<String> {
    if let Ok(path) = std::env::var("SHIPPING_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let path = match dirs::data_local_dir() {
        Some(data_dir) => {
            let dir = data_dir.join("shipping-import");
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("无法创建数据目录: {}", dir.display()))?;
            dir.join(DB_FILE_NAME)
        }
        None => PathBuf::from(DB_FILE_NAME),
    };

    Ok(path.to_string_lossy().to_string())
}

async fn run() -> anyhow::Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let file = match args.next().filter(|s| !s.trim().is_empty()) {
        Some(file) => file,
        None => {
            eprintln!("用法: shipping-import <file> [db_path] [imported_by]");
            return Ok(ExitCode::from(2));
        }
    };
    let db_path = match args.next().filter(|s| !s.trim().is_empty()) {
        Some(path) => path,
        None => default_db_path()?,
    };
    let imported_by = args.next();

    tracing::info!(version = shipping_import::VERSION, db = %db_path, "{}", shipping_import::APP_NAME);

    let api = ShippingApi::new(&db_path).context("数据库初始化失败")?;

    match api.import_file(&file, imported_by.as_deref()).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_payload())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "运行失败");
            eprintln!("错误: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
