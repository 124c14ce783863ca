pub mod bid_ledger;
pub mod directory;
pub mod http;

pub use self::{bid_ledger::*, directory::*, http::*};
use crate::{
    error::{ListingError, ListingResult},
    listing::{Listing, ListingIdRef},
    persistence::{Connection, Persistence, Transaction},
    store::SharedListingStore,
};
use anyhow::{format_err, Context, Result};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use tracing::{error, info};

/// A long-running service, driven by repeatedly calling [`run_iteration`]
///
/// An iteration should return within a fraction of a second so that a
/// stop request is noticed.
///
/// [`run_iteration`]: LoopService::run_iteration
pub trait LoopService: Send {
    fn run_iteration(&mut self) -> Result<()>;
}

/// Shared stop switch for every service of the process
///
/// Any service failing (or panicking) flips the switch and the others wind
/// down after their current iteration. Ctrl-C flips it too.
#[derive(Clone, Default)]
pub struct ServiceControl {
    stop_all: Arc<AtomicBool>,
}

impl ServiceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_all(&self) {
        self.stop_all.store(true, Ordering::SeqCst);
    }

    fn is_stopping(&self) -> bool {
        self.stop_all.load(Ordering::SeqCst)
    }

    /// Run `service` on its own thread, named `name`, until it fails or
    /// everything is told to stop
    pub fn spawn_loop<S>(&self, name: &str, mut service: S) -> Result<JoinHandle>
    where
        S: LoopService + 'static,
    {
        let svc_ctr = self.clone();
        let thread_name = name.to_owned();
        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let res = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
                    while !svc_ctr.is_stopping() {
                        service.run_iteration()?;
                    }
                    Ok(())
                }))
                .unwrap_or_else(|_| Err(format_err!("service panicked")));

                match &res {
                    Ok(()) => info!(service = %thread_name, "service stopped"),
                    Err(e) => {
                        error!(service = %thread_name, "service failed, stopping all: {e:#}");
                        svc_ctr.stop_all();
                    }
                }
                res
            })
            .with_context(|| format!("failed to start service {name}"))?;

        Ok(JoinHandle {
            svc_ctr: self.clone(),
            thread: Some(thread),
        })
    }
}

/// Handle to a running service; dropping it stops everything and waits
pub struct JoinHandle {
    svc_ctr: ServiceControl,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl JoinHandle {
    fn join_mut(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| format_err!("service thread could not be joined"))?,
            None => Ok(()),
        }
    }

    /// Wait for the service to end, returning why it did
    pub fn join(mut self) -> Result<()> {
        self.join_mut()
    }
}

impl Drop for JoinHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.svc_ctr.stop_all();
        }
        if let Err(e) = self.join_mut() {
            error!("service terminated with an error: {e:#}");
        }
    }
}

/// Load a listing for update, let `f` change it, and save it back, all in
/// one transaction
///
/// If `f` fails nothing is written.
fn modify_listing<P, T, F>(
    persistence: &P,
    store: &SharedListingStore<P>,
    id: ListingIdRef,
    f: F,
) -> ListingResult<(Listing, T)>
where
    P: Persistence,
    F: FnOnce(&mut Listing) -> ListingResult<T>,
{
    let mut connection = persistence.get_connection()?;
    let mut transaction = connection.start_transaction()?;

    let mut listing = store
        .find_by_id_for_update_tr(&mut transaction, id)?
        .ok_or_else(|| ListingError::NotFound(id.to_owned()))?;
    let out = f(&mut listing)?;
    store.save_tr(&mut transaction, &listing)?;

    transaction.commit()?;
    Ok((listing, out))
}
