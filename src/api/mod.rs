// ==========================================
// 发运导入与对账引擎 - API 层
// ==========================================
// 职责: 提供导入与查询接口，供 CLI 或外层服务调用
// ==========================================

pub mod error;
pub mod shipping_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use shipping_api::{
    BatchImportItem, BatchImportResponse, DashboardResponse, PoDetailResponse, PoListResponse,
    ShippingApi,
};
