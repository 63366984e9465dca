use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::db::repository;
use crate::error::{AppError, Result};
use crate::types::{GradeRecord, Observation, OpportunityId};

/// Work items for the database writer task.
#[derive(Debug)]
pub enum WriteMsg {
    /// One merged poll: rows to upsert and ids that left the feed.
    Poll {
        observations: Vec<Observation>,
        removed: Vec<OpportunityId>,
    },
    /// Grades computed by one recorder pass.
    Grades(Vec<GradeRecord>),
}

/// Sender half handed to the poller, the recorder and the API.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteMsg>,
}

impl WriterHandle {
    pub async fn send(&self, msg: WriteMsg) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| AppError::ChannelSend(e.to_string()))
    }

    /// Messages waiting to be written.
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Receives write messages and persists them to SQLite.
/// Runs as a dedicated background task so polling and request handling never
/// wait on disk.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    rx: mpsc::Receiver<WriteMsg>,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool, capacity: usize) -> (Self, WriterHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { pool, rx }, WriterHandle { tx })
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            if let Err(e) = self.write(&msg).await {
                error!("DB write error: {e}");
            }
        }
        debug!("DB writer channel closed");
    }

    async fn write(&self, msg: &WriteMsg) -> Result<()> {
        match msg {
            WriteMsg::Poll {
                observations,
                removed,
            } => repository::write_poll(&self.pool, observations, removed).await,
            WriteMsg::Grades(records) => repository::insert_grades(&self.pool, records).await,
        }
    }
}
