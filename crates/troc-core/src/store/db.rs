use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use crate::errors::ChatError;
use crate::models::message::now_millis;
use crate::models::{Message, MessagePreview, Participant, Thread};

/// Persistence for threads, participants, and messages. Single source of
/// truth and sole mutator of persisted message rows; sessions hold only
/// read-through caches on top of it.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, ChatError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|e| ChatError::TransientWrite {
            message: format!("failed to create data dir: {e}"),
        })?;

        let conn = Connection::open(data_dir.join(crate::constants::DB_FILE_NAME))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                subject_ref TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS participants (
                thread_id TEXT NOT NULL REFERENCES threads(id),
                user_id TEXT NOT NULL,
                UNIQUE (thread_id, user_id)
            );
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL REFERENCES threads(id),
                sender_id TEXT NOT NULL,
                content TEXT NOT NULL,
                sent_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_thread
                ON messages (thread_id, sent_at, seq);
            CREATE INDEX IF NOT EXISTS idx_participants_user
                ON participants (user_id);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, ChatError> {
        self.conn.lock().map_err(|_| ChatError::Lock {
            resource: "database".to_string(),
        })
    }

    /// Create a thread between two distinct users. The two participant rows
    /// are written in the same transaction as the thread itself.
    pub fn create_thread(
        &self,
        user_a: &str,
        user_b: &str,
        subject_ref: Option<&str>,
    ) -> Result<Thread, ChatError> {
        if user_a == user_b {
            return Err(ChatError::Validation {
                message: "a thread needs two distinct participants".to_string(),
            });
        }

        let thread = Thread {
            id: Uuid::new_v4().to_string(),
            subject_ref: subject_ref.map(|s| s.to_string()),
            created_at: now_millis(),
        };

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO threads (id, subject_ref, created_at) VALUES (?1, ?2, ?3)",
            params![thread.id, thread.subject_ref, thread.created_at as i64],
        )?;
        for user in [user_a, user_b] {
            tx.execute(
                "INSERT INTO participants (thread_id, user_id) VALUES (?1, ?2)",
                params![thread.id, user],
            )?;
        }
        tx.commit()?;

        tracing::debug!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    /// Append a message. `sent_at` is stamped here with the store clock,
    /// clamped to be non-decreasing within the thread; the autoincrement
    /// `seq` is the arrival-order tie-break between concurrent senders.
    pub fn append_message(
        &self,
        thread_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation {
                message: "message content is empty".to_string(),
            });
        }

        let conn = self.lock_conn()?;
        let is_participant: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE thread_id = ?1 AND user_id = ?2)",
            params![thread_id, sender_id],
            |row| row.get(0),
        )?;
        if !is_participant {
            return Err(ChatError::NotFound {
                what: format!("participant {sender_id} in thread {thread_id}"),
            });
        }

        let last_sent_at: u64 = conn
            .query_row(
                "SELECT COALESCE(MAX(sent_at), 0) FROM messages WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v as u64)?;
        let sent_at = now_millis().max(last_sent_at);

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO messages (id, thread_id, sender_id, content, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, thread_id, sender_id, content, sent_at as i64],
        )?;
        let seq = conn.last_insert_rowid();

        Ok(Message {
            id,
            thread_id: thread_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            sent_at,
            seq,
        })
    }

    /// All messages of a thread, totally ordered by `(sent_at, seq)`.
    pub fn history(&self, thread_id: &str) -> Result<Vec<Message>, ChatError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, thread_id, sender_id, content, sent_at, seq
             FROM messages WHERE thread_id = ?1
             ORDER BY sent_at ASC, seq ASC",
        )?;
        let rows = stmt.query_map(params![thread_id], |row| {
            Ok(Message {
                id: row.get(0)?,
                thread_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                sent_at: row.get::<_, i64>(4)? as u64,
                seq: row.get(5)?,
            })
        })?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn threads_for(&self, user_id: &str) -> Result<Vec<Thread>, ChatError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.subject_ref, t.created_at
             FROM threads t JOIN participants p ON p.thread_id = t.id
             WHERE p.user_id = ?1
             ORDER BY t.created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Thread {
                id: row.get(0)?,
                subject_ref: row.get(1)?,
                created_at: row.get::<_, i64>(2)? as u64,
            })
        })?;
        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    pub fn is_participant(&self, thread_id: &str, user_id: &str) -> Result<bool, ChatError> {
        let conn = self.lock_conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE thread_id = ?1 AND user_id = ?2)",
            params![thread_id, user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Has this sender already sent this exact content in this thread?
    /// Used by the restricted-mode preset-exhaustion check.
    pub fn sender_sent_content(
        &self,
        thread_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<bool, ChatError> {
        let conn = self.lock_conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages
             WHERE thread_id = ?1 AND sender_id = ?2 AND content = ?3)",
            params![thread_id, sender_id, content],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Participant rows for many threads in one statement. Inbox building
    /// must stay a constant number of queries regardless of thread count.
    pub fn participants_for_threads(
        &self,
        thread_ids: &[String],
    ) -> Result<Vec<Participant>, ChatError> {
        if thread_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT thread_id, user_id FROM participants WHERE thread_id IN ({})",
            placeholders(thread_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(thread_ids.iter()), |row| {
            Ok(Participant {
                thread_id: row.get(0)?,
                user_id: row.get(1)?,
            })
        })?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    /// Latest message per thread for many threads in one statement.
    pub fn last_messages(
        &self,
        thread_ids: &[String],
    ) -> Result<HashMap<String, MessagePreview>, ChatError> {
        if thread_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT m.thread_id, m.content, m.sent_at
             FROM messages m
             JOIN (SELECT thread_id, MAX(seq) AS max_seq FROM messages
                   WHERE thread_id IN ({})
                   GROUP BY thread_id) latest
               ON m.thread_id = latest.thread_id AND m.seq = latest.max_seq",
            placeholders(thread_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(thread_ids.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                MessagePreview {
                    content: row.get(1)?,
                    sent_at: row.get::<_, i64>(2)? as u64,
                },
            ))
        })?;
        let mut previews = HashMap::new();
        for row in rows {
            let (thread_id, preview) = row?;
            previews.insert(thread_id, preview);
        }
        Ok(previews)
    }
}

/// `?,?,...,?` for an IN clause of `n` values.
fn placeholders(n: usize) -> String {
    let mut s = "?,".repeat(n);
    s.pop();
    s
}
