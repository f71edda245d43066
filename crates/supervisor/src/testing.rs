//! Scripted in-memory driver used by the kernel and supervisor tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    driver::{Driver, LifecycleEvent},
    error::DriverError,
    options::TransportOptions,
};

/// What one call to `connect` does.
#[derive(Debug, Clone)]
pub enum OnConnect {
    /// Resolve without emitting anything.
    Resolve,
    /// Emit `connected`, then resolve.
    EmitConnected,
    /// Emit `error` and never resolve.
    EmitErrorAndHang(String),
    /// Reject with the given error.
    Reject(DriverError),
    /// Never resolve.
    Hang,
}

#[derive(Debug)]
pub struct ScriptedDriver {
    /// `None` once the event stream was closed
    events: Mutex<Option<broadcast::Sender<LifecycleEvent>>>,
    script: Mutex<VecDeque<OnConnect>>,
    connects: Mutex<Vec<(String, TransportOptions)>>,
    closes: AtomicUsize,
    close_delay: Mutex<Duration>,
    close_fails: AtomicBool,
    debug: AtomicBool,
}

impl ScriptedDriver {
    /// Calls beyond the script resolve without emitting.
    pub fn new(script: Vec<OnConnect>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events: Mutex::new(Some(events)),
            script: Mutex::new(script.into()),
            connects: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            close_delay: Mutex::new(Duration::ZERO),
            close_fails: AtomicBool::new(false),
            debug: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, event: LifecycleEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    /// Drops the sender, closing every subscribed receiver.
    pub fn close_events(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn connect_calls(&self) -> Vec<(String, TransportOptions)> {
        self.connects.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock().unwrap() = delay;
    }

    pub fn set_close_fails(&self, fails: bool) {
        self.close_fails.store(fails, Ordering::SeqCst);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, |events| events.receiver_count())
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        match self.events.lock().unwrap().as_ref() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    async fn connect(&self, uri: &str, options: &TransportOptions) -> Result<(), DriverError> {
        self.connects
            .lock()
            .unwrap()
            .push((uri.to_string(), options.clone()));
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(OnConnect::Resolve);
        match behavior {
            OnConnect::Resolve => Ok(()),
            OnConnect::EmitConnected => {
                self.emit(LifecycleEvent::Connected);
                Ok(())
            }
            OnConnect::EmitErrorAndHang(message) => {
                self.emit(LifecycleEvent::Error(message));
                std::future::pending().await
            }
            OnConnect::Reject(error) => Err(error),
            OnConnect::Hang => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.close_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.close_fails.load(Ordering::SeqCst) {
            return Err(DriverError::Close("already closed".into()));
        }
        Ok(())
    }

    fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::SeqCst);
    }
}
