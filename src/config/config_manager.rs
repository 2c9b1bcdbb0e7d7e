// ==========================================
// 发运导入与对账引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)，仅使用 global scope
// ==========================================

use crate::config::import_config_trait::{
    ShippingConfigReader, DEFAULT_ACTOR, DEFAULT_CARTON_SHEET, DEFAULT_HISTORY_LIMIT,
    DEFAULT_PO_SHEET,
};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Clone)]
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值（空白值视为缺省）
    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有 global 配置的快照（JSON 格式）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// ShippingConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ShippingConfigReader for ConfigManager {
    async fn get_po_sheet_name(&self) -> ConfigResult<String> {
        self.get_config_or_default(config_keys::PO_SHEET_NAME, DEFAULT_PO_SHEET)
    }

    async fn get_carton_sheet_name(&self) -> ConfigResult<String> {
        self.get_config_or_default(config_keys::CARTON_SHEET_NAME, DEFAULT_CARTON_SHEET)
    }

    async fn get_default_actor(&self) -> ConfigResult<String> {
        self.get_config_or_default(config_keys::DEFAULT_ACTOR, DEFAULT_ACTOR)
    }

    async fn get_history_limit(&self) -> ConfigResult<i64> {
        let default = DEFAULT_HISTORY_LIMIT.to_string();
        let value = self.get_config_or_default(config_keys::HISTORY_LIMIT, &default)?;
        let limit = value.parse::<i64>().map_err(|e| {
            format!("配置值格式错误 (key: {}, value: {}): {}", config_keys::HISTORY_LIMIT, value, e)
        })?;
        if limit <= 0 {
            return Err(format!(
                "配置值格式错误 (key: {}, value: {}): 必须为正整数",
                config_keys::HISTORY_LIMIT,
                value
            )
            .into());
        }
        Ok(limit)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 工作表
    pub const PO_SHEET_NAME: &str = "shipping_import.po_sheet_name";
    pub const CARTON_SHEET_NAME: &str = "shipping_import.carton_sheet_name";

    // 导入人
    pub const DEFAULT_ACTOR: &str = "shipping_import.default_actor";

    // 导入历史
    pub const HISTORY_LIMIT: &str = "shipping_import.history_limit";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::import_config_trait::ImportSettings;
    use crate::db::init_schema;

    fn setup_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_absent() {
        let manager = setup_manager();
        let settings = manager.load_import_settings().await.unwrap();
        assert_eq!(settings, ImportSettings::default());
    }

    #[tokio::test]
    async fn test_overrides_from_config_kv() {
        let manager = setup_manager();
        manager
            .set_global_config_value(config_keys::PO_SHEET_NAME, "Ordenes")
            .unwrap();
        manager
            .set_global_config_value(config_keys::HISTORY_LIMIT, "50")
            .unwrap();

        assert_eq!(manager.get_po_sheet_name().await.unwrap(), "Ordenes");
        assert_eq!(manager.get_carton_sheet_name().await.unwrap(), "Cartons");
        assert_eq!(manager.get_history_limit().await.unwrap(), 50);

        let snapshot = manager.get_config_snapshot().unwrap();
        assert!(snapshot.contains("Ordenes"));
    }

    #[tokio::test]
    async fn test_malformed_history_limit_is_error() {
        let manager = setup_manager();
        manager
            .set_global_config_value(config_keys::HISTORY_LIMIT, "many")
            .unwrap();
        assert!(manager.get_history_limit().await.is_err());

        manager
            .set_global_config_value(config_keys::HISTORY_LIMIT, "0")
            .unwrap();
        assert!(manager.get_history_limit().await.is_err());
    }
}
