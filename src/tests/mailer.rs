use crate::service::mailer::{
    InMemoryMailer, LogMailer, Mail, Mailer, NotificationDispatcher,
};
use crate::service::LoopService;
use anyhow::{bail, Result};
use std::time::{Duration, Instant};

fn mail(to: &str) -> Mail {
    Mail {
        to: to.to_owned(),
        subject: "subject".to_owned(),
        body: "body".to_owned(),
        attachment: None,
    }
}

struct BrokenMailer;

impl Mailer for BrokenMailer {
    fn send(&self, _mail: &Mail) -> Result<()> {
        bail!("mail channel down")
    }
}

#[test]
fn delivers_in_order() -> Result<()> {
    let mailer = InMemoryMailer::new_shared();
    let (mut dispatcher, handle) =
        NotificationDispatcher::new(mailer.clone(), Duration::ZERO);

    handle.enqueue(mail("first@x.test"));
    handle.enqueue(mail("second@x.test"));
    dispatcher.run_iteration()?;
    dispatcher.run_iteration()?;

    let sent = mailer.sent.lock();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, "first@x.test");
    assert_eq!(sent[1].to, "second@x.test");
    Ok(())
}

#[test]
fn send_failure_never_stops_the_loop() -> Result<()> {
    let (mut dispatcher, handle) =
        NotificationDispatcher::new(std::sync::Arc::new(BrokenMailer), Duration::ZERO);

    handle.enqueue(mail("a@x.test"));
    handle.enqueue(mail("b@x.test"));

    // both iterations come back clean; the failures are logged and dropped
    dispatcher.run_iteration()?;
    dispatcher.run_iteration()?;
    Ok(())
}

#[test]
fn batch_sends_keep_their_spacing() -> Result<()> {
    let mailer = InMemoryMailer::new_shared();
    let (mut dispatcher, handle) =
        NotificationDispatcher::new(mailer.clone(), Duration::from_millis(40));

    handle.enqueue_batch(vec![
        mail("a@x.test"),
        mail("b@x.test"),
        mail("c@x.test"),
    ]);

    let started = Instant::now();
    for _ in 0..3 {
        dispatcher.run_iteration()?;
    }
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(mailer.sent.lock().len(), 3);
    Ok(())
}

#[test]
fn log_mailer_accepts_everything() -> Result<()> {
    LogMailer.send(&mail("anyone@x.test"))
}
