//! Deadline-detached response scheduling.
//!
//! Slack wants a 2xx within three seconds, but the real work behind a slash
//! command or button click often takes longer. The responder lets a handler
//! acknowledge immediately while the response function keeps running in its
//! own task under its own budget.
//!
//! ```text
//! request ctx ──values_only──► detached ctx ──with_timeout(budget)──► bounded ctx
//!                                                                      │
//!                         ┌────────────── spawn ◄──────────────────────┘
//!                         ▼
//!                 response task ──oneshot──► supervisor ◄── bounded ctx done
//!                                                │
//!                                     Completed / Failed / TimedOut
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::context::Context;
use crate::error::Result;
use crate::notify::{Notification, Notifier};
use crate::payload::{InteractionCallback, SlashCommand};
use crate::respond::timeout::TimeoutConfig;

/// Terminal state of a response task, as observed by its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The response function returned `Ok`.
    Completed,
    /// The response function returned an error or died without reporting.
    Failed(String),
    /// The budget elapsed first. The task may still be running.
    TimedOut,
}

/// Handle to a scheduled response. Dropping it detaches the supervisor.
#[derive(Debug)]
pub struct ResponseHandle {
    endpoint: String,
    budget: Duration,
    supervisor: JoinHandle<TaskOutcome>,
}

impl ResponseHandle {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Wait for the supervisor to observe an outcome.
    pub async fn outcome(self) -> std::result::Result<TaskOutcome, JoinError> {
        self.supervisor.await
    }
}

/// Response budgets per payload kind, plus the notification sink.
#[derive(Clone, Default)]
pub struct ResponderConfig {
    pub slash: TimeoutConfig,
    pub callback: TimeoutConfig,
    pub notifier: Option<Arc<dyn Notifier>>,
}

/// Schedules response functions as detached, budget-bounded tasks.
#[derive(Clone)]
pub struct Responder {
    config: Arc<ResponderConfig>,
}

impl Responder {
    pub fn new(config: ResponderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Run `respond` against the slash command installed in `ctx`, using the
    /// slash command budgets.
    ///
    /// Fails with `PayloadNotFound` before anything is scheduled if the
    /// verification middleware did not run.
    pub fn respond_slash<F, Fut>(
        &self,
        ctx: &Context,
        endpoint: &str,
        respond: F,
    ) -> Result<ResponseHandle>
    where
        F: FnOnce(Context, SlashCommand) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let cmd = ctx.slash_command()?.clone();

        Ok(self.schedule(ctx, endpoint, &self.config.slash, move |ctx| {
            respond(ctx, cmd)
        }))
    }

    /// Run `respond` against the interaction callback installed in `ctx`,
    /// using the callback budgets.
    pub fn respond_callback<F, Fut>(
        &self,
        ctx: &Context,
        endpoint: &str,
        respond: F,
    ) -> Result<ResponseHandle>
    where
        F: FnOnce(Context, InteractionCallback) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback = ctx.interaction_callback()?.clone();

        Ok(self.schedule(ctx, endpoint, &self.config.callback, move |ctx| {
            respond(ctx, callback)
        }))
    }

    /// Spawn `respond` under a context that keeps the values of `parent`,
    /// drops its deadline and cancellation, and expires after the budget
    /// `policy` resolves for `endpoint`. Returns immediately.
    ///
    /// A supervisor task races completion against the budget and emits at
    /// most one notification. On timeout the response task is abandoned,
    /// not aborted; it stops early only if it watches its context.
    pub fn schedule<F, Fut>(
        &self,
        parent: &Context,
        endpoint: &str,
        policy: &TimeoutConfig,
        respond: F,
    ) -> ResponseHandle
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let budget = policy.resolve(endpoint);
        let bounded = Context::values_only(parent).with_timeout(budget);

        info!(
            endpoint = %endpoint,
            budget_ms = budget.as_millis() as u64,
            "response_scheduled"
        );

        // Capacity one: the task can always report, even after the
        // supervisor stopped listening.
        let (done_tx, done_rx) = oneshot::channel::<anyhow::Result<()>>();

        let task_ctx = bounded.clone();
        tokio::spawn(async move {
            let result = respond(task_ctx).await;
            let _ = done_tx.send(result);
        });

        let supervisor = tokio::spawn(supervise(
            endpoint.to_string(),
            budget,
            bounded,
            done_rx,
            policy.warn_deadline_exceeded,
            policy.log_success,
            self.config.notifier.clone(),
        ));

        ResponseHandle {
            endpoint: endpoint.to_string(),
            budget,
            supervisor,
        }
    }
}

async fn supervise(
    endpoint: String,
    budget: Duration,
    ctx: Context,
    done_rx: oneshot::Receiver<anyhow::Result<()>>,
    warn_deadline_exceeded: bool,
    log_success: bool,
    notifier: Option<Arc<dyn Notifier>>,
) -> TaskOutcome {
    let started = Instant::now();

    // A task that returns as its deadline fires has timed out: the deadline
    // branch is checked first.
    let (outcome, notification) = tokio::select! {
        biased;

        _ = ctx.done() => {
            warn!(
                endpoint = %endpoint,
                budget_ms = budget.as_millis() as u64,
                "response_deadline_exceeded"
            );
            let notification =
                warn_deadline_exceeded.then(|| Notification::timeout(&endpoint, budget));
            (TaskOutcome::TimedOut, notification)
        }
        result = done_rx => {
            match result {
                Ok(Ok(())) => {
                    let elapsed = started.elapsed();
                    info!(
                        endpoint = %endpoint,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "response_completed"
                    );
                    let notification =
                        log_success.then(|| Notification::success(&endpoint, elapsed));
                    (TaskOutcome::Completed, notification)
                }
                Ok(Err(e)) => {
                    let error = format!("{:#}", e);
                    error!(endpoint = %endpoint, error = %error, "response_failed");
                    let notification = Notification::failure(&endpoint, error.clone());
                    (TaskOutcome::Failed(error), Some(notification))
                }
                Err(_) => {
                    let error = "response task ended without reporting a result".to_string();
                    error!(endpoint = %endpoint, "response_task_lost");
                    let notification = Notification::failure(&endpoint, error.clone());
                    (TaskOutcome::Failed(error), Some(notification))
                }
            }
        }
    };

    if let Some(notification) = notification {
        deliver(notifier.as_deref(), &notification).await;
    }

    outcome
}

/// Best-effort delivery. Failures are logged and dropped.
async fn deliver(notifier: Option<&dyn Notifier>, notification: &Notification) {
    let Some(notifier) = notifier else {
        warn!(endpoint = %notification.endpoint(), "notification_sink_not_configured");
        return;
    };

    if let Err(e) = notifier.notify(notification).await {
        warn!(
            endpoint = %notification.endpoint(),
            error = %e,
            "notification_delivery_failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tokio::time::sleep;

    use crate::context::ContextError;
    use crate::error::Error;

    #[derive(Default)]
    struct RecordingNotifier {
        received: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        fn received(&self) -> Vec<Notification> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.received.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            Err(Error::NotificationDelivery("error channel not configured".into()))
        }
    }

    fn responder(slash: TimeoutConfig, notifier: Arc<dyn Notifier>) -> Responder {
        Responder::new(ResponderConfig {
            slash,
            callback: TimeoutConfig::default(),
            notifier: Some(notifier),
        })
    }

    fn sleeper(
        duration: Duration,
    ) -> impl FnOnce(Context) -> futures::future::BoxFuture<'static, anyhow::Result<()>> {
        move |_ctx| {
            Box::pin(async move {
                sleep(duration).await;
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_notifies_exactly_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::new(Duration::from_millis(5)).warn_deadline_exceeded(true);
        let responder = responder(policy.clone(), notifier.clone());

        let handle = responder.schedule(
            &Context::background(),
            "/send_message",
            &policy,
            sleeper(Duration::from_millis(100)),
        );

        assert_eq!(handle.budget(), Duration::from_millis(5));
        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::TimedOut);

        // Let the abandoned task finish; nothing else may be reported.
        sleep(Duration::from_millis(200)).await;

        let received = notifier.received();
        assert_eq!(received.len(), 1);
        assert!(matches!(
            &received[0],
            Notification::Timeout { endpoint, budget, .. }
                if endpoint == "/send_message" && *budget == Duration::from_millis(5)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_warning_is_silent() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::new(Duration::from_millis(5));
        let responder = responder(policy.clone(), notifier.clone());

        let handle = responder.schedule(
            &Context::background(),
            "/send_message",
            &policy,
            sleeper(Duration::from_millis(10)),
        );

        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::TimedOut);
        sleep(Duration::from_millis(50)).await;
        assert!(notifier.received().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_allows_completion() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::new(Duration::from_millis(5))
            .with_override("/send_message", Duration::from_millis(100))
            .warn_deadline_exceeded(true);
        let responder = responder(policy.clone(), notifier.clone());

        let handle = responder.schedule(
            &Context::background(),
            "/send_message",
            &policy,
            sleeper(Duration::from_millis(10)),
        );

        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::Completed);
        sleep(Duration::from_millis(200)).await;
        assert!(notifier.received().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_can_shorten_global() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::new(Duration::from_millis(30))
            .with_override("/send_message", Duration::from_millis(5))
            .warn_deadline_exceeded(true);
        let responder = responder(policy.clone(), notifier.clone());

        let handle = responder.schedule(
            &Context::background(),
            "/send_message",
            &policy,
            sleeper(Duration::from_millis(10)),
        );

        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::TimedOut);
        assert_eq!(notifier.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_reports_failure() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::default().warn_deadline_exceeded(true);
        let responder = responder(policy.clone(), notifier.clone());

        let handle = responder.schedule(&Context::background(), "/callback", &policy, |_ctx| async {
            Err(anyhow!("chat.postMessage: channel_not_found"))
        });

        assert_eq!(
            handle.outcome().await.unwrap(),
            TaskOutcome::Failed("chat.postMessage: channel_not_found".into())
        );

        let received = notifier.received();
        assert_eq!(received.len(), 1);
        assert!(matches!(
            &received[0],
            Notification::Failure { endpoint, error, .. }
                if endpoint == "/callback" && error.contains("channel_not_found")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_notification_when_enabled() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::default().log_success(true);
        let responder = responder(policy.clone(), notifier.clone());

        let handle = responder.schedule(
            &Context::background(),
            "/cmd",
            &policy,
            sleeper(Duration::from_millis(10)),
        );

        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::Completed);
        let received = notifier.received();
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], Notification::Success { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_tasks_are_isolated() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::new(Duration::from_millis(20))
            .with_override("/slow", Duration::from_millis(5))
            .with_override("/fast", Duration::from_millis(100))
            .warn_deadline_exceeded(true);
        let responder = responder(policy.clone(), notifier.clone());
        let ctx = Context::background();

        let slow = responder.schedule(&ctx, "/slow", &policy, sleeper(Duration::from_millis(50)));
        let fast = responder.schedule(&ctx, "/fast", &policy, sleeper(Duration::from_millis(10)));

        let (slow, fast) = futures::future::join(slow.outcome(), fast.outcome()).await;
        assert_eq!(slow.unwrap(), TaskOutcome::TimedOut);
        assert_eq!(fast.unwrap(), TaskOutcome::Completed);

        sleep(Duration::from_millis(200)).await;
        let received = notifier.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].endpoint(), "/slow");
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_sees_values_and_fresh_deadline() {
        #[derive(Clone)]
        struct RequestId(&'static str);

        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::new(Duration::from_millis(50));
        let responder = responder(policy.clone(), notifier.clone());

        let (request_ctx, request_cancel) = Context::background()
            .with_value(RequestId("req-42"))
            .with_timeout(Duration::from_millis(1))
            .with_cancel();

        let (seen_tx, seen_rx) = oneshot::channel();
        let handle = responder.schedule(&request_ctx, "/cmd", &policy, move |ctx| async move {
            // The handler returning cancels the request context.
            sleep(Duration::from_millis(10)).await;
            let id = ctx.value::<RequestId>().map(|id| id.0);
            let _ = seen_tx.send((id, ctx.err(), ctx.deadline().is_some()));
            Ok(())
        });
        request_cancel.cancel();

        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::Completed);
        let (id, err, has_deadline) = seen_rx.await.unwrap();
        assert_eq!(id, Some("req-42"));
        assert_eq!(err, None);
        assert!(has_deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_task_observes_deadline() {
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = TimeoutConfig::new(Duration::from_millis(5));
        let responder = responder(policy.clone(), notifier.clone());

        let (stopped_tx, stopped_rx) = oneshot::channel();
        let handle = responder.schedule(&Context::background(), "/cmd", &policy, move |ctx| {
            async move {
                tokio::select! {
                    _ = sleep(Duration::from_secs(60)) => {}
                    _ = ctx.done() => {
                        let _ = stopped_tx.send(ctx.err());
                    }
                }
                Ok(())
            }
        });

        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::TimedOut);
        assert_eq!(stopped_rx.await.unwrap(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_return_at_deadline_is_single_timeout() {
        for _ in 0..20 {
            let notifier = Arc::new(RecordingNotifier::default());
            let policy = TimeoutConfig::new(Duration::from_millis(5))
                .warn_deadline_exceeded(true)
                .log_success(true);
            let responder = responder(policy.clone(), notifier.clone());

            let handle = responder.schedule(
                &Context::background(),
                "/cmd",
                &policy,
                |ctx| async move {
                    ctx.done().await;
                    Ok(())
                },
            );

            assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::TimedOut);
            let received = notifier.received();
            assert_eq!(received.len(), 1);
            assert!(matches!(received[0], Notification::Timeout { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_failure_is_swallowed() {
        let policy = TimeoutConfig::new(Duration::from_millis(5)).warn_deadline_exceeded(true);
        let responder = responder(policy.clone(), Arc::new(FailingNotifier));

        let handle = responder.schedule(
            &Context::background(),
            "/cmd",
            &policy,
            sleeper(Duration::from_millis(10)),
        );

        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_slash_requires_payload() {
        let notifier = Arc::new(RecordingNotifier::default());
        let responder = responder(TimeoutConfig::default(), notifier);

        let result =
            responder.respond_slash(&Context::background(), "/cmd", |_ctx, _cmd| async { Ok(()) });

        assert!(matches!(result, Err(Error::PayloadNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_slash_uses_slash_budget() {
        let notifier = Arc::new(RecordingNotifier::default());
        let responder = Responder::new(ResponderConfig {
            slash: TimeoutConfig::new(Duration::from_millis(5)).warn_deadline_exceeded(true),
            callback: TimeoutConfig::new(Duration::from_secs(5)),
            notifier: Some(notifier.clone()),
        });
        let ctx = Context::background().with_value(SlashCommand {
            command: "/deploy".into(),
            ..Default::default()
        });

        let (cmd_tx, cmd_rx) = oneshot::channel();
        let handle = responder
            .respond_slash(&ctx, "/slack/commands/deploy", move |_ctx, cmd| async move {
                let _ = cmd_tx.send(cmd.command);
                sleep(Duration::from_millis(10)).await;
                Ok(())
            })
            .unwrap();

        assert_eq!(handle.budget(), Duration::from_millis(5));
        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::TimedOut);
        assert_eq!(cmd_rx.await.unwrap(), "/deploy");
        assert_eq!(notifier.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_callback_uses_callback_budget() {
        let notifier = Arc::new(RecordingNotifier::default());
        let responder = Responder::new(ResponderConfig {
            slash: TimeoutConfig::new(Duration::from_millis(5)),
            callback: TimeoutConfig::new(Duration::from_millis(100)),
            notifier: Some(notifier.clone()),
        });
        let ctx = Context::background().with_value(InteractionCallback::default());

        let handle = responder
            .respond_callback(&ctx, "/slack/interactions", |_ctx, _callback| async {
                sleep(Duration::from_millis(10)).await;
                Ok(())
            })
            .unwrap();

        assert_eq!(handle.budget(), Duration::from_millis(100));
        assert_eq!(handle.outcome().await.unwrap(), TaskOutcome::Completed);
        assert!(notifier.received().is_empty());
    }
}
