//! Notification Dispatcher
//!
//! Fire-and-forget outbound email. Everything that wants to notify someone
//! enqueues through a [`DispatcherHandle`]; a single worker loop owns the
//! external channel, so batch sends can keep a minimum spacing between
//! messages for the provider's rate limit. A failed send is logged and
//! dropped, it never reaches whoever queued the mail.
use super::LoopService;
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
}

/// One outbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// The external mail channel.
pub trait Mailer {
    fn send(&self, mail: &Mail) -> Result<()>;
}

pub type SharedMailer = Arc<dyn Mailer + Send + Sync + 'static>;

struct QueuedMail {
    mail: Mail,
    /// Part of a batch: keep the configured spacing after sending it.
    paced: bool,
}

#[derive(Default)]
struct Queue {
    inner: Mutex<VecDeque<QueuedMail>>,
    condvar: Condvar,
}

/// Cheap cloneable enqueue-side of the dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    queue: Arc<Queue>,
}

impl DispatcherHandle {
    pub fn enqueue(&self, mail: Mail) {
        self.push(mail, false);
    }

    pub fn enqueue_batch(&self, mails: Vec<Mail>) {
        for mail in mails {
            self.push(mail, true);
        }
    }

    fn push(&self, mail: Mail, paced: bool) {
        self.queue.inner.lock().push_back(QueuedMail { mail, paced });
        self.queue.condvar.notify_one();
    }
}

/// The worker side: a [`LoopService`] draining the queue one send at a time.
pub struct NotificationDispatcher {
    queue: Arc<Queue>,
    mailer: SharedMailer,
    batch_spacing: Duration,
}

impl NotificationDispatcher {
    pub fn new(mailer: SharedMailer, batch_spacing: Duration) -> (Self, DispatcherHandle) {
        let queue = Arc::new(Queue::default());
        (
            Self {
                queue: queue.clone(),
                mailer,
                batch_spacing,
            },
            DispatcherHandle { queue },
        )
    }

    fn pop(&self, timeout: Duration) -> Option<QueuedMail> {
        let mut queue = self.queue.inner.lock();
        if queue.is_empty() {
            self.queue.condvar.wait_for(&mut queue, timeout);
        }
        queue.pop_front()
    }
}

impl LoopService for NotificationDispatcher {
    fn run_iteration(&mut self) -> Result<()> {
        let queued = match self.pop(Duration::from_secs(1)) {
            Some(queued) => queued,
            None => return Ok(()),
        };

        match self.mailer.send(&queued.mail) {
            Ok(()) => debug!(to = %queued.mail.to, subject = %queued.mail.subject, "mail sent"),
            // Delivery failure never propagates to whoever queued the mail.
            Err(e) => warn!(to = %queued.mail.to, error = %e, "failed to send mail"),
        }

        if queued.paced {
            std::thread::sleep(self.batch_spacing);
        }

        Ok(())
    }
}

/// Mailer used when no provider is configured: logs instead of sending.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: &Mail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "mail (no provider configured)");
        Ok(())
    }
}

/// Sends through an HTTP mail-provider webhook as one JSON document.
///
/// The agent's timeout bounds every send, so a batch can never stall
/// indefinitely on one unreachable recipient.
pub struct HttpApiMailer {
    agent: ureq::Agent,
    endpoint: String,
    from: String,
}

impl HttpApiMailer {
    pub fn new(endpoint: String, from: String, send_timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(send_timeout).build(),
            endpoint,
            from,
        }
    }

    pub fn new_shared(endpoint: String, from: String, send_timeout: Duration) -> SharedMailer {
        Arc::new(Self::new(endpoint, from, send_timeout))
    }
}

impl Mailer for HttpApiMailer {
    fn send(&self, mail: &Mail) -> Result<()> {
        self.agent.post(&self.endpoint).send_json(serde_json::json!({
            "from": self.from,
            "to": mail.to,
            "subject": mail.subject,
            "html": mail.body,
            "attachment": mail.attachment,
        }))?;
        Ok(())
    }
}

/// Test mailer capturing everything it is asked to send.
#[derive(Default)]
pub struct InMemoryMailer {
    pub sent: Mutex<Vec<Mail>>,
}

impl InMemoryMailer {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Mailer for InMemoryMailer {
    fn send(&self, mail: &Mail) -> Result<()> {
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}
