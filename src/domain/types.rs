// ==========================================
// 发运导入与对账引擎 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// PO 生命周期状态 (PO Status)
// ==========================================
// 导入时为 IMPORTED，其后由生产/发运流程推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoStatus {
    Imported,     // 已导入
    InProduction, // 生产中
    InShipping,   // 发运中
    Completed,    // 已完成
    Shipped,      // 已发出
    Cancelled,    // 已取消
}

impl PoStatus {
    pub const ALL: [PoStatus; 6] = [
        PoStatus::Imported,
        PoStatus::InProduction,
        PoStatus::InShipping,
        PoStatus::Completed,
        PoStatus::Shipped,
        PoStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoStatus::Imported => "IMPORTED",
            PoStatus::InProduction => "IN_PRODUCTION",
            PoStatus::InShipping => "IN_SHIPPING",
            PoStatus::Completed => "COMPLETED",
            PoStatus::Shipped => "SHIPPED",
            PoStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IMPORTED" => Ok(PoStatus::Imported),
            "IN_PRODUCTION" => Ok(PoStatus::InProduction),
            "IN_SHIPPING" => Ok(PoStatus::InShipping),
            "COMPLETED" => Ok(PoStatus::Completed),
            "SHIPPED" => Ok(PoStatus::Shipped),
            "CANCELLED" => Ok(PoStatus::Cancelled),
            other => Err(format!("未知的 PO 状态: {}", other)),
        }
    }
}

// ==========================================
// 箱型 (Carton Kind)
// ==========================================
// 由同一箱号下不同 SKU 的数量派生，不信任源文件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartonKind {
    Mono,    // 单品箱
    Musical, // 混装箱
}

impl CartonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartonKind::Mono => "MONO",
            CartonKind::Musical => "MUSICAL",
        }
    }
}

impl fmt::Display for CartonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CartonKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MONO" => Ok(CartonKind::Mono),
            "MUSICAL" => Ok(CartonKind::Musical),
            other => Err(format!("未知的箱型: {}", other)),
        }
    }
}

// ==========================================
// 箱单行状态 (Carton Status)
// ==========================================
// 由扫码/装箱流程推进，导入时为 PENDING
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartonStatus {
    Pending,   // 待扫码
    Completed, // 已完成
    Linked,    // 已关联容器
}

impl CartonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartonStatus::Pending => "PENDING",
            CartonStatus::Completed => "COMPLETED",
            CartonStatus::Linked => "LINKED",
        }
    }
}

impl fmt::Display for CartonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CartonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(CartonStatus::Pending),
            "COMPLETED" => Ok(CartonStatus::Completed),
            "LINKED" => Ok(CartonStatus::Linked),
            other => Err(format!("未知的箱单状态: {}", other)),
        }
    }
}
