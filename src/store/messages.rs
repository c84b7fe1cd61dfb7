//! Message log and delivery reports.
//!
//! Every observed message lands here, linked to a contact, a connection, or
//! both. The XOR invariant is checked at write time and the write does not
//! occur on violation. When only a connection is given and it has a bound
//! contact, the contact is denormalized onto the row: if the connection is
//! later stolen, the message keeps pointing at who it came from at the time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use super::{connections, StoreError};

/// Direction of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Received from a transport.
    Incoming,
    /// Sent through a transport.
    Outgoing,
}

impl Direction {
    /// Single-character code stored in the `direction` column.
    pub fn code(self) -> &'static str {
        match self {
            Direction::Incoming => "I",
            Direction::Outgoing => "O",
        }
    }

    fn from_code(code: &str) -> Result<Self, StoreError> {
        match code {
            "I" => Ok(Direction::Incoming),
            "O" => Ok(Direction::Outgoing),
            other => Err(StoreError::Validation(format!(
                "unknown direction code: {other:?}"
            ))),
        }
    }
}

/// A new message about to be logged.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// The contact this message is attributed to, if known.
    pub contact_id: Option<i64>,
    /// The connection it travelled over, if known.
    pub connection_id: Option<i64>,
    /// Incoming or outgoing.
    pub direction: Direction,
    /// When the message was observed.
    pub date: DateTime<Utc>,
    /// Message body.
    pub text: String,
}

/// A logged message row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Primary key.
    pub id: i64,
    /// Attributed contact, possibly auto-populated from the connection.
    pub contact_id: Option<i64>,
    /// Connection the message travelled over.
    pub connection_id: Option<i64>,
    /// Incoming or outgoing.
    pub direction: Direction,
    /// When the message was observed.
    pub date: DateTime<Utc>,
    /// Message body.
    pub text: String,
}

/// Validate and insert a message row.
///
/// Exactly one of contact/connection must be meaningful: both null is
/// rejected, and when both are set they must resolve to the same contact.
/// A connection-only message whose connection has a bound contact gets
/// `contact_id` filled in before the insert.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] on an invariant violation (nothing is
/// written), or [`StoreError::Database`] on SQLite failure.
pub async fn save(conn: &mut SqliteConnection, new: &NewMessage) -> Result<Message, StoreError> {
    let mut contact_id = new.contact_id;

    match (new.contact_id, new.connection_id) {
        (None, None) => {
            return Err(StoreError::Validation(
                "a message needs a contact or a connection".to_owned(),
            ));
        }
        (Some(contact), Some(connection_id)) => {
            let connection = connections::load(conn, connection_id).await?;
            if connection.contact_id != Some(contact) {
                return Err(StoreError::Validation(format!(
                    "message contact {contact} does not match connection {connection_id}'s contact"
                )));
            }
        }
        (None, Some(connection_id)) => {
            let connection = connections::load(conn, connection_id).await?;
            contact_id = connection.contact_id;
        }
        (Some(_), None) => {}
    }

    let result = sqlx::query(
        "INSERT INTO messages (contact_id, connection_id, direction, date, text) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(contact_id)
    .bind(new.connection_id)
    .bind(new.direction.code())
    .bind(new.date.to_rfc3339())
    .bind(&new.text)
    .execute(&mut *conn)
    .await?;

    Ok(Message {
        id: result.last_insert_rowid(),
        contact_id,
        connection_id: new.connection_id,
        direction: new.direction,
        date: new.date,
        text: new.text.clone(),
    })
}

/// Load a message by primary key.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if no message matches, or
/// [`StoreError::Database`] on SQLite failure.
pub async fn load(conn: &mut SqliteConnection, message_id: i64) -> Result<Message, StoreError> {
    let row: (i64, Option<i64>, Option<i64>, String, String, String) = sqlx::query_as(
        "SELECT id, contact_id, connection_id, direction, date, text \
         FROM messages WHERE id = ?1",
    )
    .bind(message_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "message",
        key: message_id.to_string(),
    })?;
    let date = DateTime::parse_from_rfc3339(&row.4)
        .map_err(|e| StoreError::Validation(format!("stored date is not RFC 3339: {e}")))?
        .with_timezone(&Utc);
    Ok(Message {
        id: row.0,
        contact_id: row.1,
        connection_id: row.2,
        direction: Direction::from_code(&row.3)?,
        date,
        text: row.5,
    })
}

/// Attach a free-form tag to a message. Idempotent per (message, tag).
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn add_tag(
    conn: &mut SqliteConnection,
    message_id: i64,
    tag: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO message_tags (message_id, tag) VALUES (?1, ?2) \
         ON CONFLICT(message_id, tag) DO NOTHING",
    )
    .bind(message_id)
    .bind(tag)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// A message's tags, sorted.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn tags(conn: &mut SqliteConnection, message_id: i64) -> Result<Vec<String>, StoreError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT tag FROM message_tags WHERE message_id = ?1 ORDER BY tag")
            .bind(message_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().map(|(tag,)| tag).collect())
}

/// A delivery report from a transport's gateway callback.
///
/// Flat, append-only; no relational invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Gateway action (e.g. "delivered", "failed").
    pub action: String,
    /// Gateway-assigned report identifier.
    pub report_id: String,
    /// Destination address the report is about.
    pub number: String,
    /// Raw report text.
    pub report: String,
}

/// Append a delivery report row.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn add_delivery_report(
    conn: &mut SqliteConnection,
    report: &DeliveryReport,
) -> Result<i64, StoreError> {
    let result = sqlx::query(
        "INSERT INTO delivery_reports (action, report_id, number, report) \
         VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&report.action)
    .bind(&report.report_id)
    .bind(&report.number)
    .bind(&report.report)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}
