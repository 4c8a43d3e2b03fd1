#![allow(dead_code)]

// Provisioning fixture
pub const TEMPLATE_SERVER: &str = "SRV1";
pub const TENANT_SERVER: &str = "SRV2";
pub const TEMPLATE_DB: &str = "TPL01";
pub const TEMPLATE_CORP_CODE: &str = "0000";
pub const CORP_CODE: &str = "1001";
pub const CORP_NAME: &str = "Acme Corp";
pub const TENANT_DB: &str = "CORP1001";
pub const TEMPLATE_TABLE_COUNT: usize = 5;

// Sync fixture
pub const SOURCE_DB: &str = "CORP1001";
pub const TARGET_DB: &str = "CORP2002";
pub const TARGET_CORP_CODE: &str = "2002";
pub const SOURCE_LINK: &str = "SRC_LINK";
