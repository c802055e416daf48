//! Static table declarations for both aggregate families.
//!
//! Field names are the names used on the wire (payload sections and
//! composed documents); column names are the SQL names. The asset family
//! speaks camelCase on the wire, the branch family speaks snake_case,
//! matching the clients already built against this API.

use crate::model::schema::{ColumnDef, ColumnSource, ColumnType, ParentRef, TableDef, TableKey};

pub const ASSET_STATUSES: &[&str] = &["Active", "Repair", "Disposed"];
pub const ASSET_CONDITIONS: &[&str] = &["New", "Good", "Moderate", "Repair", "Scrap"];
pub const PRINTER_TYPES: &[&str] = &["USB", "Network"];
pub const PRINTER_STATUSES: &[&str] = &["Active", "Down"];

const ASSET_REF: ParentRef = ParentRef {
    table: "assets",
    field: "assetId",
    column: "asset_id",
};

const BRANCH_REF: ParentRef = ParentRef {
    table: "branches",
    field: "branch_id",
    column: "branch_id",
};

// ---------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------

/// Maintenance stations a branch can be assigned to
pub static SERVICE_STATIONS: TableDef = TableDef {
    name: "service_stations",
    key: TableKey::Serial,
    parent: None,
    columns: &[
        ColumnDef::text("name", "name", 255).required(),
        ColumnDef::text("manager_name", "manager_name", 255),
        ColumnDef::text("manager_email", "manager_email", 255),
        ColumnDef::text("contact", "contact", 50),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

// ---------------------------------------------------------------------
// Asset family
// ---------------------------------------------------------------------

pub static ASSETS: TableDef = TableDef {
    name: "assets",
    key: TableKey::Serial,
    parent: None,
    columns: &[
        ColumnDef::text("assetCode", "asset_code", 50).required(),
        ColumnDef::text("assetName", "asset_name", 150).required(),
        ColumnDef::text("brandedOptionCode", "branded_option_code", 1),
        ColumnDef::text("groupId", "group_id", 1),
        ColumnDef::text("subCategoryCode", "sub_category_code", 5),
        ColumnDef::text("brand", "brand", 100),
        ColumnDef::text("branch", "branch", 100),
        ColumnDef::text("departmentId", "department_id", 10),
        ColumnDef::text("userAllocated", "user_allocated", 100),
        ColumnDef::new("purchaseDate", "purchase_date", ColumnType::Date),
        ColumnDef::new("warrantyExp", "warranty_exp", ColumnType::Date),
        ColumnDef::new("status", "status", ColumnType::Enum(ASSET_STATUSES)).with_default("Active"),
        ColumnDef::new(
            "assetCondition",
            "asset_condition",
            ColumnType::Enum(ASSET_CONDITIONS),
        )
        .with_default("Good"),
        ColumnDef::created_at("createdAt", "created_at"),
        ColumnDef::updated_at("updatedAt", "updated_at"),
    ],
    unique: &["assetCode"],
};

pub static ASSET_TECHNICAL: TableDef = TableDef {
    name: "asset_technical_details",
    key: TableKey::Parent,
    parent: Some(ASSET_REF),
    columns: &[
        ColumnDef::text("cpu", "cpu", 100),
        ColumnDef::text("ram", "ram", 50),
        ColumnDef::text("storage", "storage", 100),
        ColumnDef::text("os", "os", 100),
        ColumnDef::text("ipAddress", "ip_address", 45),
        ColumnDef::text("domainName", "domain_name", 100),
        ColumnDef::text("serialNo", "serial_no", 100),
        ColumnDef::long_text("otherSpecs", "other_specs"),
    ],
    unique: &[],
};

pub static ASSET_COMMERCIAL: TableDef = TableDef {
    name: "asset_commercial_details",
    key: TableKey::Parent,
    parent: Some(ASSET_REF),
    columns: &[
        ColumnDef::text("vendorName", "vendor_name", 150),
        ColumnDef::text("poNo", "po_no", 50),
        ColumnDef::text("invoiceNo", "invoice_no", 50),
        ColumnDef::new("amount", "amount", ColumnType::Decimal),
        ColumnDef::text("amcVendor", "amc_vendor", 150),
        ColumnDef::new("amcExp", "amc_exp", ColumnType::Date),
        ColumnDef::long_text("remarks", "remarks"),
    ],
    unique: &[],
};

pub static ASSET_LICENSE: TableDef = TableDef {
    name: "asset_license_details",
    key: TableKey::Parent,
    parent: Some(ASSET_REF),
    columns: &[
        ColumnDef::new("noOfLicenses", "no_of_licenses", ColumnType::Integer),
        ColumnDef::text("licenseKeyHash", "license_key_hash", 255)
            .derived(ColumnSource::Sha256Of("licenseKey")),
        ColumnDef::new("licenseExp", "license_exp", ColumnType::Date),
        ColumnDef::long_text("licenseNotes", "license_notes").with_alias("notes"),
    ],
    unique: &[],
};

pub static ASSET_REMARKS: TableDef = TableDef {
    name: "asset_remarks",
    key: TableKey::Serial,
    parent: Some(ASSET_REF),
    columns: &[
        ColumnDef::long_text("remarks", "remarks").required(),
        ColumnDef::text("updatedBy", "updated_by", 100).required(),
        ColumnDef::new("dateUpdated", "date_updated", ColumnType::DateTime).required(),
    ],
    unique: &[],
};

// ---------------------------------------------------------------------
// Branch family
// ---------------------------------------------------------------------

pub static BRANCHES: TableDef = TableDef {
    name: "branches",
    key: TableKey::Serial,
    parent: None,
    columns: &[
        ColumnDef::text("name", "name", 255).required(),
        ColumnDef::text("manager_name", "manager_name", 100),
        ColumnDef::text("address", "address", 255),
        ColumnDef::new("contact", "contact", ColumnType::Phone),
        ColumnDef::text("ext_no", "ext_no", 50),
        ColumnDef::new("service_station_id", "service_station_id", ColumnType::Integer),
        ColumnDef::text("region", "region", 255),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &["name"],
};

pub static BRANCH_INFRA: TableDef = TableDef {
    name: "branch_infra",
    key: TableKey::Parent,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::new("total_staff", "total_staff", ColumnType::Integer),
        ColumnDef::text("connectivity_status", "connectivity_status", 255),
        ColumnDef::text("connectivity_wlink", "connectivity_wlink", 255),
        ColumnDef::text("connectivity_lan_ip", "connectivity_lan_ip", 255),
        ColumnDef::text("connectivity_lan_switch", "connectivity_lan_switch", 255),
        ColumnDef::text("connectivity_network", "connectivity_network", 255),
        ColumnDef::text("connectivity_wifi", "connectivity_wifi", 255),
        ColumnDef::text("biometrics_ip", "biometrics_ip", 255),
        ColumnDef::new("ups_total_no", "ups_total_no", ColumnType::Integer),
        ColumnDef::text("ups_model", "ups_model", 255),
        ColumnDef::text("ups_backup_time", "ups_backup_time", 255),
        ColumnDef::text("ups_installer", "ups_installer", 255),
        ColumnDef::text("ups_rating", "ups_rating", 100),
        ColumnDef::text("battery_rating", "battery_rating", 100),
        ColumnDef::new("ups_purchase_year", "ups_purchase_year", ColumnType::Integer),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_SCANNERS: TableDef = TableDef {
    name: "branch_scanners",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::text("scanner_name", "scanner_name", 255),
        ColumnDef::text("scanner_model", "scanner_model", 255),
        ColumnDef::text("scanner_number", "scanner_number", 100),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_PROJECTORS: TableDef = TableDef {
    name: "branch_projectors",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::text("projector_name", "projector_name", 255),
        ColumnDef::text("projector_model", "projector_model", 255),
        ColumnDef::new(
            "projector_purchase_date",
            "projector_purchase_date",
            ColumnType::DateTime,
        ),
        ColumnDef::text("projector_status", "projector_status", 255),
        ColumnDef::text("location", "location", 255),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_PRINTERS: TableDef = TableDef {
    name: "branch_printers",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::text("printer_name", "printer_name", 255),
        ColumnDef::text("printer_model", "printer_model", 255),
        ColumnDef::long_text("remarks", "remarks"),
        ColumnDef::new("printer_type", "printer_type", ColumnType::Enum(PRINTER_TYPES))
            .with_default("USB"),
        ColumnDef::new(
            "printer_status",
            "printer_status",
            ColumnType::Enum(PRINTER_STATUSES),
        )
        .with_default("Active"),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_DESKTOPS: TableDef = TableDef {
    name: "branch_desktops",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::new("desktop_total_no", "desktop_total_no", ColumnType::Integer),
        ColumnDef::text("desktop_brand", "desktop_brand", 255),
        ColumnDef::text("desktop_ram", "desktop_ram", 255),
        ColumnDef::text("desktop_ssd", "desktop_ssd", 255),
        ColumnDef::new(
            "desktop_purchase_date",
            "desktop_purchase_date",
            ColumnType::DateTime,
        ),
        ColumnDef::text("desktop_fiscal_year", "desktop_fiscal_year", 20),
        ColumnDef::text("desktop_processor", "desktop_processor", 255),
        ColumnDef::text("desktop_domain", "desktop_domain", 255),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_LAPTOPS: TableDef = TableDef {
    name: "branch_laptops",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::new("laptop_total_no", "laptop_total_no", ColumnType::Integer),
        ColumnDef::text("laptop_brand", "laptop_brand", 255),
        ColumnDef::text("laptop_ram", "laptop_ram", 255),
        ColumnDef::text("laptop_ssd", "laptop_ssd", 255),
        ColumnDef::text("laptop_processor", "laptop_processor", 255),
        ColumnDef::text("laptop_domain", "laptop_domain", 255),
        ColumnDef::text("laptop_user", "laptop_user", 255),
        ColumnDef::new(
            "laptop_purchase_date",
            "laptop_purchase_date",
            ColumnType::DateTime,
        ),
        ColumnDef::text("laptop_fiscal_year", "laptop_fiscal_year", 20),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_CCTVS: TableDef = TableDef {
    name: "branch_cctv",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::new("cctv_total_no", "cctv_total_no", ColumnType::Integer),
        ColumnDef::text("cctv_nvr_ip", "cctv_nvr_ip", 255),
        ColumnDef::text("cctv_camera_ip", "cctv_camera_ip", 255),
        ColumnDef::new("cctv_installed_year", "cctv_installed_year", ColumnType::Integer),
        ColumnDef::new("cctv_record_days", "cctv_record_days", ColumnType::Integer),
        ColumnDef::long_text("cctv_nvr_details", "cctv_nvr_details"),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_PANELS: TableDef = TableDef {
    name: "branch_panels",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::text("panel_ip", "panel_ip", 255),
        ColumnDef::text("panel_name", "panel_name", 255),
        ColumnDef::text("panel_brand", "panel_brand", 255),
        ColumnDef::text("panel_user", "panel_user", 255),
        ColumnDef::new("panel_purchase_year", "panel_purchase_year", ColumnType::Integer),
        ColumnDef::text("panel_status", "panel_status", 255),
        ColumnDef::text("location", "location", 255),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_IP_PHONES: TableDef = TableDef {
    name: "branch_ip_phones",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::text("ip_telephone_status", "ip_telephone_status", 255),
        ColumnDef::text("ip_telephone_ip", "ip_telephone_ip", 255),
        ColumnDef::text("ip_telephone_ext_no", "ip_telephone_ext_no", 255),
        ColumnDef::text("model", "model", 255),
        ColumnDef::created_at("created_at", "created_at"),
        ColumnDef::updated_at("updated_at", "updated_at"),
    ],
    unique: &[],
};

pub static BRANCH_REMARKS: TableDef = TableDef {
    name: "branch_remarks",
    key: TableKey::Serial,
    parent: Some(BRANCH_REF),
    columns: &[
        ColumnDef::long_text("remarks", "remarks").required(),
        ColumnDef::text("updatedBy", "updated_by", 100).required(),
        ColumnDef::new("dateUpdated", "date_updated", ColumnType::DateTime).required(),
    ],
    unique: &[],
};
