use serde::{Deserialize, Serialize};

/// A single schema change. Actions are ordered lists of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateTable {
        table: String,
        columns: Vec<Column>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        unique: Vec<Vec<String>>,
    },
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    DropColumn {
        table: String,
        column: String,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    DropIndex {
        name: String,
    },
    /// Raw SQL. When `dialect` is set the statement only runs on that dialect.
    Execute {
        sql: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dialect: Option<String>,
    },
}

impl Operation {
    /// Whether this operation applies to a store speaking `dialect`.
    pub fn applies_to(&self, dialect: &str) -> bool {
        match self {
            Operation::Execute {
                dialect: Some(d), ..
            } => d.eq_ignore_ascii_case(dialect),
            _ => true,
        }
    }

    /// Short human description, used in logs and `history --verbose`.
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateTable { table, .. } => format!("create table {table}"),
            Operation::DropTable { table } => format!("drop table {table}"),
            Operation::AddColumn { table, column } => {
                format!("add column {table}.{}", column.name)
            }
            Operation::DropColumn { table, column } => format!("drop column {table}.{column}"),
            Operation::CreateIndex { name, table, .. } => format!("create index {name} on {table}"),
            Operation::DropIndex { name } => format!("drop index {name}"),
            Operation::Execute { dialect, .. } => match dialect {
                Some(d) => format!("execute sql ({d} only)"),
                None => "execute sql".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    /// Raw SQL default expression, e.g. `0`, `'false'`, `CURRENT_TIMESTAMP`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Foreign key target as `table.column`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            length: None,
            values: Vec::new(),
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.references = Some(target.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    String,
    Json,
    Datetime,
    Enum,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_deserialize_from_tagged_yaml_shape() {
        let json = r#"[
            {"op": "add_column", "table": "players",
             "column": {"name": "vp_breakdown", "type": "json"}},
            {"op": "create_index", "name": "ix_combat_logs_game_id",
             "table": "combat_logs", "columns": ["game_id"]},
            {"op": "execute", "sql": "ALTER TYPE actiontype ADD VALUE 'colonize'",
             "dialect": "postgresql"}
        ]"#;
        let ops: Vec<Operation> = serde_json::from_str(json).unwrap();
        assert_eq!(ops.len(), 3);
        match &ops[0] {
            Operation::AddColumn { table, column } => {
                assert_eq!(table, "players");
                assert_eq!(column.kind, ColumnType::Json);
                assert!(column.nullable);
            }
            other => panic!("expected AddColumn, got {other:?}"),
        }
        match &ops[1] {
            Operation::CreateIndex { unique, .. } => assert!(!unique),
            other => panic!("expected CreateIndex, got {other:?}"),
        }
    }

    #[test]
    fn dialect_guard_filters_execute_only() {
        let pg_only = Operation::Execute {
            sql: "DROP TYPE tiletype".into(),
            dialect: Some("postgresql".into()),
        };
        assert!(!pg_only.applies_to("sqlite"));
        assert!(pg_only.applies_to("PostgreSQL"));

        let any = Operation::Execute {
            sql: "SELECT 1".into(),
            dialect: None,
        };
        assert!(any.applies_to("sqlite"));
        assert!(Operation::DropTable { table: "t".into() }.applies_to("sqlite"));
    }

    #[test]
    fn column_builder_sets_flags() {
        let col = Column::new("id", ColumnType::Integer).primary_key();
        assert!(col.primary_key);
        assert!(!col.nullable);

        let col = Column::new("host_user_id", ColumnType::Integer).references("users.id");
        assert_eq!(col.references.as_deref(), Some("users.id"));
    }

    #[test]
    fn describe_names_the_target() {
        let op = Operation::DropColumn {
            table: "games".into(),
            column: "host_user_id".into(),
        };
        assert_eq!(op.describe(), "drop column games.host_user_id");
    }
}
