//! Request lifecycle of one trigger firing.
//!
//! `config → (drop?) → before → fetch → after → finally → merge → merged`,
//! with `error` announced whenever a stage is cancelled or the exchange
//! fails. The in-flight entry is released on every path once dispatch began.

use std::rc::Rc;

use async_trait::async_trait;
use futures::future::{AbortRegistration, Abortable};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    descriptor::RequestDescriptor,
    hooks::ConfigHook,
    inflight::{InFlight, InFlightGuard},
    reconcile::{MergePlan, Outcome, ResponseSnapshot, SkipReason, assess},
    signal::Stage,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("the `{0}` stage was cancelled by a listener")]
    Cancelled(Stage),
    #[error("request was aborted")]
    Aborted,
    #[error("request could not be sent: {0}")]
    Transport(String),
    #[error("request body could not be encoded: {0}")]
    Encoding(String),
    #[error("merge failed: {0}")]
    Merge(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// State shared with listeners at every stage.
pub struct Exchange {
    pub request: RequestDescriptor,
    /// The element's in-flight set; config listeners may abort earlier requests.
    pub requests: InFlight,
    pub response: Option<ResponseSnapshot>,
    pub outcome: Option<Outcome>,
    pub error: Option<PipelineError>,
}

impl Exchange {
    pub fn new(request: RequestDescriptor, requests: InFlight) -> Self {
        Self {
            request,
            requests,
            response: None,
            outcome: None,
            error: None,
        }
    }
}

/// The environment a pipeline runs in: the DOM in the browser, a recorder in tests.
#[async_trait(?Send)]
pub trait Host {
    /// Announce `stage`; returns `false` when a listener cancelled it.
    fn signal(&self, stage: Stage, exchange: &mut Exchange) -> bool;

    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, PipelineError>;

    async fn merge(&self, plan: &MergePlan, exchange: &Exchange) -> Result<(), PipelineError>;

    fn navigate(&self, location: &str) -> Result<(), PipelineError>;
}

/// Outcome of [`Pipeline::prepare`].
pub struct Prepared {
    exchange: Exchange,
    state: PreparedState,
}

enum PreparedState {
    Settled(Settled),
    /// Tracked in the element's in-flight set from here on.
    Ready {
        guard: InFlightGuard,
        registration: AbortRegistration,
    },
}

impl Prepared {
    fn settled(exchange: Exchange, settled: Settled) -> Self {
        Self {
            exchange,
            state: PreparedState::Settled(settled),
        }
    }

    pub fn prevent_default(&self) -> bool {
        self.exchange.request.prevent_default
    }

    /// Set when the firing already ended during preparation.
    pub fn settled_early(&self) -> Option<&Settled> {
        match &self.state {
            PreparedState::Settled(settled) => Some(settled),
            PreparedState::Ready { .. } => None,
        }
    }
}

/// How a firing ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// Another request from the same element was in flight; nothing was sent.
    Dropped,
    Redirected(String),
    Skipped(SkipReason),
    Merged,
    Failed(PipelineError),
}

pub struct Pipeline<H> {
    host: H,
    hooks: Rc<[Box<dyn ConfigHook>]>,
}

impl<H: Host> Pipeline<H> {
    pub fn new(host: H, hooks: Rc<[Box<dyn ConfigHook>]>) -> Self {
        Self { host, hooks }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run a firing to completion.
    pub async fn fire(&self, requests: &InFlight, request: RequestDescriptor) -> Settled {
        let prepared = self.prepare(requests, request);
        self.dispatch(prepared).await
    }

    /// Synchronous half of a firing: config hooks, the config signal, the
    /// drop check and in-flight registration. Runs inside the DOM event
    /// handler so the default action can still be prevented.
    pub fn prepare(&self, requests: &InFlight, request: RequestDescriptor) -> Prepared {
        let mut exchange = Exchange::new(request, requests.clone());
        exchange.request.drop = !requests.is_empty();

        for hook in self.hooks.iter() {
            if let Err(err) = hook.configure(&mut exchange) {
                let settled = self.fail(&mut exchange, err);
                return Prepared::settled(exchange, settled);
            }
        }
        if !self.host.signal(Stage::Config, &mut exchange) {
            let settled = self.fail(&mut exchange, PipelineError::Cancelled(Stage::Config));
            return Prepared::settled(exchange, settled);
        }
        if exchange.request.drop {
            debug!(
                target = "patchwork::client::pipeline",
                action = %exchange.request.action,
                in_flight = requests.len(),
                "dropped trigger while a request is in flight"
            );
            return Prepared::settled(exchange, Settled::Dropped);
        }
        exchange.request.fold_query();

        let (guard, registration) = requests.register();
        Prepared {
            exchange,
            state: PreparedState::Ready {
                guard,
                registration,
            },
        }
    }

    /// Asynchronous half: network exchange, merge decision and merge.
    pub async fn dispatch(&self, prepared: Prepared) -> Settled {
        let Prepared {
            mut exchange,
            state,
        } = prepared;
        let (guard, registration) = match state {
            PreparedState::Settled(settled) => return settled,
            PreparedState::Ready {
                guard,
                registration,
            } => (guard, registration),
        };

        let result = self.exchange(&mut exchange, registration).await;
        drop(guard);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report(&mut exchange, err.clone());
                self.host.signal(Stage::Finally, &mut exchange);
                return Settled::Failed(err);
            }
        };
        self.host.signal(Stage::Finally, &mut exchange);

        match outcome {
            Outcome::Redirect(location) => match self.host.navigate(&location) {
                Ok(()) => Settled::Redirected(location),
                Err(err) => self.fail(&mut exchange, err),
            },
            Outcome::Skip(reason) => {
                debug!(
                    target = "patchwork::client::pipeline",
                    action = %exchange.request.action,
                    reason = %reason,
                    "response not merged"
                );
                Settled::Skipped(reason)
            }
            Outcome::Merge(plan) => {
                if let Err(err) = self.host.merge(&plan, &exchange).await {
                    return self.fail(&mut exchange, err);
                }
                self.host.signal(Stage::Merged, &mut exchange);
                Settled::Merged
            }
        }
    }

    async fn exchange(
        &self,
        exchange: &mut Exchange,
        registration: AbortRegistration,
    ) -> Result<Outcome, PipelineError> {
        if !self.host.signal(Stage::Before, exchange) {
            return Err(PipelineError::Cancelled(Stage::Before));
        }

        let response = Abortable::new(self.host.fetch(&exchange.request), registration)
            .await
            .map_err(|_| PipelineError::Aborted)??;

        let outcome = assess(&exchange.request, &response);
        exchange.response = Some(response);
        exchange.outcome = Some(outcome.clone());

        if !self.host.signal(Stage::After, exchange) {
            return Err(PipelineError::Cancelled(Stage::After));
        }
        Ok(outcome)
    }

    fn fail(&self, exchange: &mut Exchange, err: PipelineError) -> Settled {
        self.report(exchange, err.clone());
        Settled::Failed(err)
    }

    fn report(&self, exchange: &mut Exchange, err: PipelineError) {
        match &err {
            PipelineError::Cancelled(stage) => debug!(
                target = "patchwork::client::pipeline",
                action = %exchange.request.action,
                stage = %stage,
                "exchange cancelled"
            ),
            PipelineError::Aborted => warn!(
                target = "patchwork::client::pipeline",
                action = %exchange.request.action,
                "exchange aborted"
            ),
            other => error!(
                target = "patchwork::client::pipeline",
                action = %exchange.request.action,
                error = %other,
                "exchange failed"
            ),
        }
        exchange.error = Some(err);
        self.host.signal(Stage::Error, exchange);
    }
}
