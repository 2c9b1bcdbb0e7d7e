// ==========================================
// 发运导入与对账引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// 默认 PO 工作表名
pub const DEFAULT_PO_SHEET: &str = "PO";
/// 默认箱单工作表名
pub const DEFAULT_CARTON_SHEET: &str = "Cartons";
/// 默认导入人
pub const DEFAULT_ACTOR: &str = "system";
/// 默认导入历史条数
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

// ==========================================
// ShippingConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ShippingConfigReader: Send + Sync {
    /// PO 工作表名
    ///
    /// # 默认值
    /// - PO
    async fn get_po_sheet_name(&self) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// 箱单工作表名
    ///
    /// # 默认值
    /// - Cartons
    async fn get_carton_sheet_name(&self) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// 未指定导入人时使用的默认值
    async fn get_default_actor(&self) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// 导入历史默认返回条数
    ///
    /// # 默认值
    /// - 20
    async fn get_history_limit(&self) -> Result<i64, Box<dyn Error + Send + Sync>>;

    /// 一次性读取全部导入配置
    async fn load_import_settings(&self) -> Result<ImportSettings, Box<dyn Error + Send + Sync>> {
        Ok(ImportSettings {
            po_sheet_name: self.get_po_sheet_name().await?,
            carton_sheet_name: self.get_carton_sheet_name().await?,
            default_actor: self.get_default_actor().await?,
            history_limit: self.get_history_limit().await?,
        })
    }
}

// ==========================================
// ImportSettings - 已解析的导入配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub po_sheet_name: String,
    pub carton_sheet_name: String,
    pub default_actor: String,
    pub history_limit: i64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            po_sheet_name: DEFAULT_PO_SHEET.to_string(),
            carton_sheet_name: DEFAULT_CARTON_SHEET.to_string(),
            default_actor: DEFAULT_ACTOR.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

// 静态配置也可直接作为读取器使用（测试、CLI 无库场景）
#[async_trait]
impl ShippingConfigReader for ImportSettings {
    async fn get_po_sheet_name(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(self.po_sheet_name.clone())
    }

    async fn get_carton_sheet_name(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(self.carton_sheet_name.clone())
    }

    async fn get_default_actor(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(self.default_actor.clone())
    }

    async fn get_history_limit(&self) -> Result<i64, Box<dyn Error + Send + Sync>> {
        Ok(self.history_limit)
    }
}
