use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use agora_store::TreeStore;
use agora_types::events::StoreEvent;
use agora_types::paths;

use crate::retry::RetryPolicy;

/// Publishing side of a live view. `None` once the view is closed.
type Gate<V> = Arc<Mutex<Option<watch::Sender<V>>>>;

/// Folds store events into the published value. Shared across restarts.
type Handler<V> = Arc<Mutex<dyn FnMut(&mut V, &StoreEvent) + Send>>;

type Restart<V> = Arc<dyn Fn(V) -> Live<V> + Send + Sync>;

/// Cancellation handle for one live subscription. Cloneable, so a screen
/// scope can hold it while the screen keeps the view itself.
#[derive(Clone)]
pub struct Subscription {
    path: String,
    detach: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stop all further notifications. Idempotent.
    pub fn cancel(&self) {
        (self.detach)();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("path", &self.path).finish()
    }
}

/// A store listener folded into an observable value by a background pump.
///
/// Publishing happens under the gate lock and `close` clears the gate under
/// the same lock, so once `close` returns no observer sees another change.
pub(crate) struct Live<V> {
    path: String,
    gate: Gate<V>,
    rx: watch::Receiver<V>,
    subscription: Subscription,
    restart: Restart<V>,
}

impl<V> Live<V>
where
    V: Send + Sync + 'static,
{
    pub fn spawn<S, F>(store: &S, path: &str, retry: RetryPolicy, initial: V, on_event: F) -> Self
    where
        S: TreeStore,
        F: FnMut(&mut V, &StoreEvent) + Send + 'static,
    {
        let handler: Handler<V> = Arc::new(Mutex::new(on_event));
        Self::start(store.clone(), paths::normalize(path), retry, initial, handler)
    }

    fn start<S: TreeStore>(
        store: S,
        path: String,
        retry: RetryPolicy,
        initial: V,
        handler: Handler<V>,
    ) -> Self {
        let (tx, rx) = watch::channel(initial);
        let gate: Gate<V> = Arc::new(Mutex::new(Some(tx)));

        // Attach synchronously so nothing written after `spawn` returns is missed.
        let listener = store.subscribe(&path);
        let pump_gate = gate.clone();
        let pump_store = store.clone();
        let pump_handler = handler.clone();
        let task = tokio::spawn(async move {
            pump(pump_store, listener, retry, &pump_gate, &pump_handler).await;
            // Ended on its own: close the channel so observers stop waiting.
            if let Ok(mut g) = pump_gate.lock() {
                g.take();
            }
        });

        let subscription = Subscription {
            path: path.clone(),
            detach: detacher(gate.clone(), task.abort_handle(), path.clone()),
        };

        let restart_path = path.clone();
        let restart: Restart<V> = Arc::new(move |initial: V| {
            Self::start(store.clone(), restart_path.clone(), retry, initial, handler.clone())
        });

        Self {
            path,
            gate,
            rx,
            subscription,
            restart,
        }
    }

    /// Close this view and attach a fresh listener on the same path,
    /// publishing from `initial`. Returns the new subscription; earlier
    /// observers see their channel closed.
    pub fn restart(&mut self, initial: V) -> Subscription {
        self.close();
        *self = (self.restart)(initial);
        debug!("Resubscribed to '{}'", self.path);
        self.subscription()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }

    pub fn watch(&self) -> watch::Receiver<V> {
        self.rx.clone()
    }

    pub fn is_active(&self) -> bool {
        self.gate.lock().map_or(false, |g| g.is_some())
    }

    /// Wait for the next published value. `false` once closed.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn borrow(&self) -> watch::Ref<'_, V> {
        self.rx.borrow()
    }

    /// Current value, marked as seen.
    pub fn borrow_and_update(&mut self) -> watch::Ref<'_, V> {
        self.rx.borrow_and_update()
    }

    pub fn close(&self) {
        self.subscription.cancel();
    }
}

impl<V> Drop for Live<V> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}

fn detacher<V>(gate: Gate<V>, abort: AbortHandle, path: String) -> Arc<dyn Fn() + Send + Sync>
where
    V: Send + Sync + 'static,
{
    Arc::new(move || {
        let closed = match gate.lock() {
            Ok(mut g) => g.take().is_some(),
            Err(_) => false,
        };
        abort.abort();
        if closed {
            debug!("Unsubscribed from '{}'", path);
        }
    })
}

async fn pump<S, V>(
    store: S,
    mut listener: agora_store::Listener,
    retry: RetryPolicy,
    gate: &Gate<V>,
    handler: &Handler<V>,
) where
    S: TreeStore,
    V: Send + Sync + 'static,
{
    let path = listener.path().to_string();
    let mut attempt = 0u32;

    loop {
        let Some(event) = listener.recv().await else {
            debug!("Listener on '{}' closed by store", path);
            return;
        };

        if let StoreEvent::Cancelled(fault) = &event {
            if let Some(delay) = retry.delay_for(attempt) {
                attempt += 1;
                warn!(
                    "Subscription to '{}' failed ({}); retry {} in {:?}",
                    path, fault, attempt, delay
                );
                tokio::time::sleep(delay).await;
                listener = store.subscribe(&path);
                continue;
            }
            warn!("Subscription to '{}' failed: {}", path, fault);
        } else if attempt > 0 {
            info!("Subscription to '{}' recovered after {} retries", path, attempt);
            attempt = 0;
        }

        {
            let Ok(guard) = gate.lock() else {
                return;
            };
            let Some(tx) = guard.as_ref() else {
                return;
            };
            let Ok(mut guard) = handler.lock() else {
                return;
            };
            let on_event = &mut *guard;
            tx.send_modify(|value| on_event(value, &event));
        }

        // A fault is reported once; the last good value stays visible.
        if matches!(event, StoreEvent::Cancelled(_)) {
            return;
        }
    }
}
