//! In-memory stand-ins for the scheduler backend and the messenger.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use drill_cron::{CronError, CronSchedule, JobCallback, SchedulerBackend};
use drill_types::{ChatId, Inbound, InlineKeyboard, MessageHandle, ReplyMarkup};
use tokio::sync::mpsc;

use crate::messenger::Messenger;

struct FakeJob {
    schedule: CronSchedule,
    callback: JobCallback,
}

/// Records registrations and fires them on demand.
#[derive(Default)]
pub(crate) struct FakeBackend {
    jobs: Mutex<BTreeMap<String, Vec<FakeJob>>>,
    rejected: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// Make `register` fail for this canonical schedule.
    pub fn reject(&self, schedule: &str) {
        self.rejected.lock().unwrap().push(schedule.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        self.jobs.lock().unwrap().keys().cloned().collect()
    }

    pub fn total_jobs(&self) -> usize {
        self.jobs.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn schedule_of(&self, job_key: &str) -> Option<CronSchedule> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(job_key)
            .and_then(|v| v.first())
            .map(|j| j.schedule.clone())
    }

    /// Run every callback registered under `job_key` to completion.
    pub async fn fire(&self, job_key: &str, at: DateTime<Utc>) -> usize {
        let callbacks: Vec<JobCallback> = {
            let jobs = self.jobs.lock().unwrap();
            jobs.get(job_key)
                .map(|v| v.iter().map(|j| j.callback.clone()).collect())
                .unwrap_or_default()
        };
        for callback in &callbacks {
            callback(at).await;
        }
        callbacks.len()
    }
}

impl SchedulerBackend for FakeBackend {
    fn register(
        &self,
        job_key: &str,
        schedule: &CronSchedule,
        callback: JobCallback,
    ) -> Result<(), CronError> {
        if self
            .rejected
            .lock()
            .unwrap()
            .iter()
            .any(|s| s == schedule.as_str())
        {
            return Err(CronError::Rejected {
                expr: schedule.to_string(),
                reason: "rejected by test backend".into(),
            });
        }
        self.jobs
            .lock()
            .unwrap()
            .entry(job_key.to_string())
            .or_default()
            .push(FakeJob {
                schedule: schedule.clone(),
                callback,
            });
        Ok(())
    }

    fn cancel_all(&self, job_key: &str) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .remove(job_key)
            .map_or(0, |v| v.len())
    }

    fn job_count(&self, job_key: &str) -> usize {
        self.jobs.lock().unwrap().get(job_key).map_or(0, Vec::len)
    }
}

/// Everything a [`RecordingMessenger`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
        markup: Option<ReplyMarkup>,
    },
    EditText {
        message: MessageHandle,
        text: String,
    },
    EditButtons {
        message: MessageHandle,
        buttons: Option<InlineKeyboard>,
    },
    Answer {
        callback_id: String,
        text: Option<String>,
    },
}

#[derive(Default)]
pub(crate) struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    failing: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    /// Make `send_text` fail for any text containing `needle`.
    pub fn fail_sends_containing(&self, needle: &str) {
        self.failing.lock().unwrap().push(needle.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Texts sent to any chat, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Inline button payloads of every sent message, in order.
    pub fn payloads(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text {
                    markup: Some(ReplyMarkup::Inline(keyboard)),
                    ..
                } => Some(keyboard),
                _ => None,
            })
            .flat_map(|k| k.rows.into_iter().flatten().map(|b| b.payload))
            .collect()
    }
}

#[async_trait::async_trait]
impl Messenger for RecordingMessenger {
    fn channel_type(&self) -> &str {
        "recording"
    }

    async fn start(&self, _sender: mpsc::Sender<Inbound>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> anyhow::Result<MessageHandle> {
        if self.failing.lock().unwrap().iter().any(|n| text.contains(n.as_str())) {
            anyhow::bail!("send to chat {chat_id} failed");
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            markup: markup.cloned(),
        });
        Ok(MessageHandle {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn edit_text(
        &self,
        message: &MessageHandle,
        text: &str,
        _buttons: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::EditText {
            message: *message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_buttons(
        &self,
        message: &MessageHandle,
        buttons: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::EditButtons {
            message: *message,
            buttons: buttons.cloned(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}
