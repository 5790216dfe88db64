use std::fmt;

/// Table holding subject demographics
pub const SUBJECT_TABLE: &str = "PATIENTS";

/// One reviewed schema mutation
///
/// Identifiers are compile-time constants; statements are never built from
/// runtime input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum SchemaCommand {
    DropIndex {
        index: &'static str,
    },
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl SchemaCommand {
    /// SQL statement applying this command
    pub fn sql(&self) -> String {
        match self {
            SchemaCommand::DropIndex { index } => format!("DROP INDEX \"{}\"", index),
            SchemaCommand::DropColumn { table, column } => {
                format!("ALTER TABLE \"{}\" DROP COLUMN \"{}\"", table, column)
            }
        }
    }
}

impl fmt::Display for SchemaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaCommand::DropIndex { index } => write!(f, "drop index {}", index),
            SchemaCommand::DropColumn { table, column } => {
                write!(f, "drop column {}.{}", table, column)
            }
        }
    }
}

const fn drop_index(index: &'static str) -> SchemaCommand {
    SchemaCommand::DropIndex { index }
}

const fn drop_column(column: &'static str) -> SchemaCommand {
    SchemaCommand::DropColumn {
        table: SUBJECT_TABLE,
        column,
    }
}

/// Indices over identifying columns; the store refuses to drop indexed columns
pub const IDENTIFYING_INDICES: [SchemaCommand; 3] = [
    drop_index("PAT_IDX1"),
    drop_index("PAT_IDX2"),
    drop_index("PAT_IDX3"),
];

/// Identifying columns of the subject table
pub const IDENTIFYING_COLUMNS: [SchemaCommand; 8] = [
    drop_column("PATIENT_NAME"),
    drop_column("PATIENT_NAME_R"),
    drop_column("PATIENT_CASE_HISTORY_NUMBER"),
    drop_column("PATIENT_ADDRESS_REGION"),
    drop_column("PATIENT_ADDRESS_AREA"),
    drop_column("PATIENT_ADDRESS_CITY"),
    drop_column("PATIENT_ADDRESS_SHF"),
    drop_column("PATIENT_NAME_STD"),
];

/// Full mutation sequence: indices first, then columns
pub fn sanitize_commands() -> impl Iterator<Item = SchemaCommand> {
    IDENTIFYING_INDICES
        .into_iter()
        .chain(IDENTIFYING_COLUMNS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql() {
        assert_eq!(IDENTIFYING_INDICES[0].sql(), "DROP INDEX \"PAT_IDX1\"");
        assert_eq!(
            IDENTIFYING_COLUMNS[0].sql(),
            "ALTER TABLE \"PATIENTS\" DROP COLUMN \"PATIENT_NAME\""
        );
    }

    #[test]
    fn test_indices_precede_columns() {
        let commands: Vec<_> = sanitize_commands().collect();
        assert_eq!(commands.len(), 11);
        let last_index = commands
            .iter()
            .rposition(|c| matches!(c, SchemaCommand::DropIndex { .. }))
            .unwrap();
        let first_column = commands
            .iter()
            .position(|c| matches!(c, SchemaCommand::DropColumn { .. }))
            .unwrap();
        assert!(last_index < first_column);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            IDENTIFYING_COLUMNS[1].to_string(),
            "drop column PATIENTS.PATIENT_NAME_R"
        );
    }
}
