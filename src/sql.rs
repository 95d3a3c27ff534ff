use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;
use crate::slot::parse_instant;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectRooms,
    SelectReservations {
        room_id: Option<RoomId>,
    },
    SelectAvailability {
        room_id: RoomId,
        start: Ms,
        end: Ms,
    },
    SelectRecommendations {
        duration_minutes: i64,
        attendees: u32,
        start_from: Ms,
        equipment: EquipmentSet,
    },
    InsertReservation {
        reservation: NewReservation,
        returning: bool,
    },
    DeleteReservation {
        id: Ulid,
    },
}

/// Column order for `INSERT INTO reservations VALUES (...)` without a column list.
const RESERVATION_COLUMNS: [&str; 7] = ["room_id", "title", "start", "end", "attendees", "purpose", "created_by"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Row shape a statement produces, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Rooms,
    Reservations,
    Availability,
    Recommendations,
}

/// Result shape from the statement's structure alone, so `$n` placeholders
/// need not be bound yet. `None` for statements that return no rows or do
/// not parse.
pub fn result_shape(sql: &str) -> Option<ResultShape> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).ok()?;
    match stmts.first()? {
        Statement::Insert(insert) => {
            if insert.returning.is_none() {
                return None;
            }
            match insert_table_name(insert).ok()?.as_str() {
                "reservations" => Some(ResultShape::Reservations),
                _ => None,
            }
        }
        Statement::Query(query) => {
            let SetExpr::Select(select) = query.body.as_ref() else {
                return None;
            };
            let table = table_factor_name(&select.from.first()?.relation).ok()?;
            match table.as_str() {
                "rooms" => Some(ResultShape::Rooms),
                "reservations" => Some(ResultShape::Reservations),
                "availability" => Some(ResultShape::Availability),
                "recommendations" => Some(ResultShape::Recommendations),
                _ => None,
            }
        }
        _ => None,
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }

    let rows = extract_insert_rows(insert)?;
    if rows.len() != 1 {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    }
    let values = &rows[0];

    let columns: Vec<String> = if insert.columns.is_empty() {
        RESERVATION_COLUMNS[..values.len().min(RESERVATION_COLUMNS.len())]
            .iter()
            .map(|c| c.to_string())
            .collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("reservations", columns.len(), values.len()));
    }

    let (mut room_id, mut title, mut start, mut end, mut attendees) = (None, None, None, None, None);
    let (mut purpose, mut created_by) = (None, None);
    for (column, value) in columns.iter().zip(values) {
        match column.as_str() {
            "room_id" => room_id = Some(RoomId::new(parse_string_expr(value)?)),
            "title" => title = Some(parse_string_expr(value)?),
            "start" => start = Some(parse_instant_expr(value)?),
            "end" => end = Some(parse_instant_expr(value)?),
            "attendees" => attendees = Some(parse_u32(value)?),
            "purpose" => purpose = parse_string_or_null(value)?,
            "created_by" => created_by = parse_string_or_null(value)?,
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::InsertReservation {
        reservation: NewReservation {
            room_id: room_id.ok_or(SqlError::MissingColumn("room_id"))?,
            title: title.ok_or(SqlError::MissingColumn("title"))?,
            start: start.ok_or(SqlError::MissingColumn("start"))?,
            end: end.ok_or(SqlError::MissingColumn("end"))?,
            attendees: attendees.ok_or(SqlError::MissingColumn("attendees"))?,
            purpose,
            created_by,
        },
        returning: insert.returning.is_some(),
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_id(&delete.selection)?;
    Ok(Command::DeleteReservation { id })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut predicates = Vec::new();
    if let Some(selection) = &select.selection {
        collect_predicates(selection, &mut predicates)?;
    }

    match table.as_str() {
        "rooms" => {
            if let Some(p) = predicates.first() {
                return Err(SqlError::Unsupported(format!("filter on rooms.{}", p.column())));
            }
            Ok(Command::SelectRooms)
        }
        "reservations" => {
            let mut room_id = None;
            for p in &predicates {
                match p {
                    Predicate::Compare { column, op: CompareOp::Eq, value } if column == "room_id" => {
                        room_id = Some(RoomId::new(parse_string_expr(value)?));
                    }
                    other => return Err(SqlError::Unsupported(format!("filter on reservations.{}", other.column()))),
                }
            }
            Ok(Command::SelectReservations { room_id })
        }
        "availability" => {
            let (mut room_id, mut start, mut end) = (None, None, None);
            for p in &predicates {
                match p {
                    Predicate::Compare { column, op: CompareOp::Eq, value } if column == "room_id" => {
                        room_id = Some(RoomId::new(parse_string_expr(value)?));
                    }
                    Predicate::Compare { column, op: CompareOp::Eq | CompareOp::GtEq, value } if column == "start" => {
                        start = Some(parse_instant_expr(value)?);
                    }
                    Predicate::Compare { column, op: CompareOp::Eq | CompareOp::LtEq, value } if column == "end" => {
                        end = Some(parse_instant_expr(value)?);
                    }
                    other => return Err(SqlError::Unsupported(format!("filter on availability.{}", other.column()))),
                }
            }
            Ok(Command::SelectAvailability {
                room_id: room_id.ok_or(SqlError::MissingFilter("room_id"))?,
                start: start.ok_or(SqlError::MissingFilter("start"))?,
                end: end.ok_or(SqlError::MissingFilter("end"))?,
            })
        }
        "recommendations" => {
            let (mut duration_minutes, mut attendees, mut start_from) = (None, None, None);
            let mut equipment = EquipmentSet::new();
            for p in &predicates {
                match p {
                    Predicate::Compare { column, op: CompareOp::Eq, value } if column == "duration_minutes" => {
                        duration_minutes = Some(parse_i64_expr(value)?);
                    }
                    Predicate::Compare { column, op: CompareOp::Eq, value } if column == "attendees" => {
                        attendees = Some(parse_u32(value)?);
                    }
                    Predicate::Compare { column, op: CompareOp::Eq | CompareOp::GtEq, value } if column == "start_from" => {
                        start_from = Some(parse_instant_expr(value)?);
                    }
                    Predicate::Compare { column, op: CompareOp::Eq, value } if column == "equipment" => {
                        add_equipment(value, &mut equipment)?;
                    }
                    Predicate::InList { column, values } if column == "equipment" => {
                        for value in *values {
                            add_equipment(value, &mut equipment)?;
                        }
                    }
                    other => return Err(SqlError::Unsupported(format!("filter on recommendations.{}", other.column()))),
                }
            }
            Ok(Command::SelectRecommendations {
                duration_minutes: duration_minutes.ok_or(SqlError::MissingFilter("duration_minutes"))?,
                attendees: attendees.ok_or(SqlError::MissingFilter("attendees"))?,
                start_from: start_from.ok_or(SqlError::MissingFilter("start_from"))?,
                equipment,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE clauses ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    GtEq,
    LtEq,
}

#[derive(Debug)]
enum Predicate<'a> {
    Compare {
        column: String,
        op: CompareOp,
        value: &'a Expr,
    },
    InList {
        column: String,
        values: &'a [Expr],
    },
}

impl Predicate<'_> {
    fn column(&self) -> &str {
        match self {
            Predicate::Compare { column, .. } | Predicate::InList { column, .. } => column,
        }
    }
}

/// Flatten a conjunction of `column <op> value` / `column IN (...)` terms.
fn collect_predicates<'a>(expr: &'a Expr, out: &mut Vec<Predicate<'a>>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_predicates(inner, out),
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                ast::BinaryOperator::And => {
                    collect_predicates(left, out)?;
                    return collect_predicates(right, out);
                }
                ast::BinaryOperator::Eq => CompareOp::Eq,
                ast::BinaryOperator::GtEq => CompareOp::GtEq,
                ast::BinaryOperator::LtEq => CompareOp::LtEq,
                _ => return Err(SqlError::Unsupported(format!("predicate {expr}"))),
            };
            let column = expr_column_name(left).ok_or_else(|| SqlError::Unsupported(format!("predicate {expr}")))?;
            out.push(Predicate::Compare { column, op, value: right });
            Ok(())
        }
        Expr::InList {
            expr: column,
            list,
            negated: false,
        } => {
            let column = expr_column_name(column).ok_or_else(|| SqlError::Unsupported(format!("predicate {expr}")))?;
            out.push(Predicate::InList { column, values: list });
            Ok(())
        }
        _ => Err(SqlError::Unsupported(format!("predicate {expr}"))),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(&values.rows)
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::InvalidValue(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string_expr(expr).map(Some),
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string_expr(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::InvalidValue(format!("bad ULID {s}: {e}")))
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::InvalidValue(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::InvalidValue(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::InvalidValue(format!("{v} out of range")))
}

/// RFC 3339 text or integer Unix millis.
fn parse_instant_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::Number(_, _)) => parse_i64_expr(expr),
        Some(Value::SingleQuotedString(s)) => parse_instant(s).map_err(|e| SqlError::InvalidValue(e.to_string())),
        _ => parse_i64_expr(expr),
    }
}

/// `'projector'` or `'projector,whiteboard'`.
fn add_equipment(expr: &Expr, set: &mut EquipmentSet) -> Result<(), SqlError> {
    let text = parse_string_expr(expr)?;
    for tag in text.split(',').filter(|t| !t.trim().is_empty()) {
        let tag: Equipment = tag.parse().map_err(|e: UnknownEquipment| SqlError::InvalidValue(e.to_string()))?;
        set.insert(tag);
    }
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingColumn(&'static str),
    /// Well-formed SQL carrying a value the domain rejects.
    InvalidValue(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for SqlError {}
