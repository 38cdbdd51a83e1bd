//! Static column registry for every reportable entity.

use serde::Serialize;

use crate::DataSource;

/// Column every entity table uses to scope rows to one company.
pub const TENANT_COLUMN: &str = "company_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Numeric,
    Integer,
    Boolean,
    Timestamp,
    Date,
    Uuid,
}

impl ColumnType {
    /// Postgres type used when casting bound text parameters.
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Numeric => "numeric",
            ColumnType::Integer => "bigint",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Date => "date",
            ColumnType::Uuid => "uuid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
}

const fn col(name: &'static str, column_type: ColumnType) -> ColumnDef {
    ColumnDef { name, column_type }
}

#[derive(Debug, Serialize)]
pub struct EntitySchema {
    pub data_source: DataSource,
    pub table: &'static str,
    pub tenant_column: &'static str,
    pub columns: &'static [ColumnDef],
}

impl EntitySchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

use ColumnType::*;

static LEADS: EntitySchema = EntitySchema {
    data_source: DataSource::Leads,
    table: "leads",
    tenant_column: TENANT_COLUMN,
    columns: &[
        col("id", Uuid),
        col("company_id", Uuid),
        col("name", Text),
        col("email", Text),
        col("phone", Text),
        col("company_name", Text),
        col("status", Text),
        col("source", Text),
        col("amount", Numeric),
        col("assigned_to", Uuid),
        col("created_at", Timestamp),
        col("updated_at", Timestamp),
    ],
};

static ACCOUNTS: EntitySchema = EntitySchema {
    data_source: DataSource::Accounts,
    table: "accounts",
    tenant_column: TENANT_COLUMN,
    columns: &[
        col("id", Uuid),
        col("company_id", Uuid),
        col("name", Text),
        col("industry", Text),
        col("status", Text),
        col("tier", Text),
        col("city", Text),
        col("country", Text),
        col("annual_revenue", Numeric),
        col("employee_count", Integer),
        col("is_active", Boolean),
        col("owner_id", Uuid),
        col("created_at", Timestamp),
    ],
};

static CONTACTS: EntitySchema = EntitySchema {
    data_source: DataSource::Contacts,
    table: "contacts",
    tenant_column: TENANT_COLUMN,
    columns: &[
        col("id", Uuid),
        col("company_id", Uuid),
        col("account_id", Uuid),
        col("first_name", Text),
        col("last_name", Text),
        col("email", Text),
        col("phone", Text),
        col("title", Text),
        col("status", Text),
        col("created_at", Timestamp),
    ],
};

static PROJECTS: EntitySchema = EntitySchema {
    data_source: DataSource::Projects,
    table: "projects",
    tenant_column: TENANT_COLUMN,
    columns: &[
        col("id", Uuid),
        col("company_id", Uuid),
        col("account_id", Uuid),
        col("name", Text),
        col("status", Text),
        col("priority", Text),
        col("budget", Numeric),
        col("total", Numeric),
        col("start_date", Date),
        col("end_date", Date),
        col("created_at", Timestamp),
    ],
};

static TASKS: EntitySchema = EntitySchema {
    data_source: DataSource::Tasks,
    table: "tasks",
    tenant_column: TENANT_COLUMN,
    columns: &[
        col("id", Uuid),
        col("company_id", Uuid),
        col("project_id", Uuid),
        col("title", Text),
        col("status", Text),
        col("priority", Text),
        col("assigned_to", Text),
        col("estimated_hours", Numeric),
        col("due_date", Date),
        col("created_at", Timestamp),
    ],
};

static QUOTES: EntitySchema = EntitySchema {
    data_source: DataSource::Quotes,
    table: "quotes",
    tenant_column: TENANT_COLUMN,
    columns: &[
        col("id", Uuid),
        col("company_id", Uuid),
        col("account_id", Uuid),
        col("quote_number", Text),
        col("status", Text),
        col("total", Numeric),
        col("valid_until", Date),
        col("created_at", Timestamp),
    ],
};

static INVOICES: EntitySchema = EntitySchema {
    data_source: DataSource::Invoices,
    table: "invoices",
    tenant_column: TENANT_COLUMN,
    columns: &[
        col("id", Uuid),
        col("company_id", Uuid),
        col("account_id", Uuid),
        col("invoice_number", Text),
        col("status", Text),
        col("total_amount", Numeric),
        col("due_date", Date),
        col("paid_at", Timestamp),
        col("created_at", Timestamp),
    ],
};

pub fn schema_for(data_source: DataSource) -> &'static EntitySchema {
    match data_source {
        DataSource::Leads => &LEADS,
        DataSource::Accounts => &ACCOUNTS,
        DataSource::Contacts => &CONTACTS,
        DataSource::Projects => &PROJECTS,
        DataSource::Tasks => &TASKS,
        DataSource::Quotes => &QUOTES,
        DataSource::Invoices => &INVOICES,
    }
}
