//! SQLite DDL rendering for schema operations.

use strata_common::{Column, ColumnType, Error, Operation, Result};

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render one operation as SQL terminated by `;`. A unique `add_column`
/// renders as two statements separated by a newline.
pub fn render(op: &Operation) -> Result<String> {
    let sql = match op {
        Operation::CreateTable {
            table,
            columns,
            unique,
        } => render_create_table(table, columns, unique)?,
        Operation::DropTable { table } => format!("DROP TABLE {};", quote_ident(table)),
        Operation::AddColumn { table, column } => render_add_column(table, column)?,
        Operation::DropColumn { table, column } => format!(
            "ALTER TABLE {} DROP COLUMN {};",
            quote_ident(table),
            quote_ident(column)
        ),
        Operation::CreateIndex {
            name,
            table,
            columns,
            unique,
        } => {
            if columns.is_empty() {
                return Err(Error::Descriptor(format!("index {name} has no columns")));
            }
            format!(
                "CREATE {}INDEX {} ON {} ({});",
                if *unique { "UNIQUE " } else { "" },
                quote_ident(name),
                quote_ident(table),
                ident_list(columns)
            )
        }
        Operation::DropIndex { name } => format!("DROP INDEX {};", quote_ident(name)),
        Operation::Execute { sql, .. } => {
            let trimmed = sql.trim();
            if trimmed.is_empty() {
                return Err(Error::Descriptor("execute operation has empty sql".into()));
            }
            if trimmed.ends_with(';') {
                trimmed.to_string()
            } else {
                format!("{trimmed};")
            }
        }
    };
    Ok(sql)
}

/// SQLite refuses `PRIMARY KEY` and `UNIQUE` in `ADD COLUMN`, so uniqueness
/// moves to an index named `uq_<table>_<column>`.
fn render_add_column(table: &str, column: &Column) -> Result<String> {
    if column.primary_key {
        return Err(Error::Descriptor(format!(
            "add column {table}.{}: a primary key cannot be added to an existing table",
            column.name
        )));
    }
    let mut def = column.clone();
    def.unique = false;
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {};",
        quote_ident(table),
        column_def(&def, false)?
    );
    if column.unique {
        sql.push_str(&format!(
            "\nCREATE UNIQUE INDEX {} ON {} ({});",
            quote_ident(&format!("uq_{table}_{}", column.name)),
            quote_ident(table),
            quote_ident(&column.name)
        ));
    }
    Ok(sql)
}

/// Check that `op` renders, without producing any SQL.
pub fn validate(op: &Operation) -> Result<()> {
    render(op).map(|_| ())
}

fn render_create_table(table: &str, columns: &[Column], unique: &[Vec<String>]) -> Result<String> {
    if columns.is_empty() {
        return Err(Error::Descriptor(format!("table {table} has no columns")));
    }

    let pk: Vec<&Column> = columns.iter().filter(|c| c.primary_key).collect();
    let inline_pk = pk.len() == 1;

    let mut parts = Vec::with_capacity(columns.len() + unique.len() + 1);
    for column in columns {
        parts.push(column_def(column, inline_pk)?);
    }
    if pk.len() > 1 {
        let names: Vec<String> = pk.iter().map(|c| c.name.clone()).collect();
        parts.push(format!("PRIMARY KEY ({})", ident_list(&names)));
    }
    for group in unique {
        if group.is_empty() {
            return Err(Error::Descriptor(format!(
                "table {table} declares an empty unique constraint"
            )));
        }
        parts.push(format!("UNIQUE ({})", ident_list(group)));
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_ident(table),
        parts.join(",\n    ")
    ))
}

fn column_def(column: &Column, inline_pk: bool) -> Result<String> {
    let mut def = format!("{} {}", quote_ident(&column.name), sql_type(column));
    if column.primary_key && inline_pk {
        def.push_str(" PRIMARY KEY");
    }
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        def.push_str(&format!(" DEFAULT {default}"));
    }
    if let Some(target) = &column.references {
        let (table, col) = target.split_once('.').ok_or_else(|| {
            Error::Descriptor(format!(
                "column {} references {target:?}, expected table.column",
                column.name
            ))
        })?;
        def.push_str(&format!(
            " REFERENCES {}({})",
            quote_ident(table),
            quote_ident(col)
        ));
    }
    if column.kind == ColumnType::Enum {
        if column.values.is_empty() {
            return Err(Error::Descriptor(format!(
                "enum column {} declares no values",
                column.name
            )));
        }
        let values: Vec<String> = column.values.iter().map(|v| quote_literal(v)).collect();
        def.push_str(&format!(
            " CHECK ({} IN ({}))",
            quote_ident(&column.name),
            values.join(", ")
        ));
    }
    Ok(def)
}

fn sql_type(column: &Column) -> String {
    match column.kind {
        ColumnType::Integer => "INTEGER".into(),
        ColumnType::Float => "REAL".into(),
        ColumnType::Boolean => "BOOLEAN".into(),
        ColumnType::Text => "TEXT".into(),
        ColumnType::String => match column.length {
            Some(len) => format!("VARCHAR({len})"),
            None => "VARCHAR".into(),
        },
        ColumnType::Json => "JSON".into(),
        ColumnType::Datetime => "DATETIME".into(),
        ColumnType::Enum => {
            let longest = column.values.iter().map(|v| v.len()).max().unwrap_or(0);
            format!("VARCHAR({})", column.length.unwrap_or(longest as u32))
        }
    }
}

fn ident_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}
