use axum::{
    Form,
    extract::State,
    response::Response,
    routing::{get, post},
};
use patchwork_protocol::SwapStrategy;
use serde::Deserialize;
use tracing::debug;

use crate::{
    application::{
        error::HttpError,
        session::{Page, RenderOptions, RenderSession},
        validation::{Validate, Validation},
    },
    infra::http::{AppState, RouteRegistrar, client_redirect},
    presentation::views::{CounterForm, CounterFormModel, CounterPage, CounterValue},
};

const MAX_STEP: i64 = 10;

pub fn register(routes: &mut RouteRegistrar) {
    routes
        .page("/counter", get(show))
        .fragment("/counter/increment", post(increment))
        .fragment("/counter/reset", post(reset));
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IncrementForm {
    amount: String,
}

impl IncrementForm {
    fn step(&self) -> Option<i64> {
        self.amount.trim().parse().ok()
    }
}

impl Validate for IncrementForm {
    fn validate(&self) -> Validation {
        let mut validation = Validation::new();
        let step = self.step();
        validation.check(step.is_some(), "amount", "Enter a whole number");
        if let Some(step) = step {
            validation.check(
                (1..=MAX_STEP).contains(&step),
                "amount",
                format!("Choose a step between 1 and {MAX_STEP}"),
            );
        }
        validation
    }
}

async fn show(
    State(state): State<AppState>,
    mut session: RenderSession,
) -> Result<Response, HttpError> {
    session.add_page(
        Page::new(CounterPage {
            value: state.store.counter(),
            form: CounterFormModel {
                amount: "1".to_string(),
                error: None,
            },
        })
        .with_title("Counter"),
    )?;
    session.render().await
}

/// Updates two regions from one exchange: the value is replaced, the form morphed.
async fn increment(
    State(state): State<AppState>,
    mut session: RenderSession,
    Form(form): Form<IncrementForm>,
) -> Result<Response, HttpError> {
    let validation = form.validate();
    let Some(step) = form.step().filter(|_| validation.is_valid()) else {
        debug!(
            target = "patchwork::demo::counter",
            amount = %form.amount,
            "rejected counter step"
        );
        session.add_model_fragment::<CounterForm>(
            CounterFormModel {
                amount: form.amount.clone(),
                error: validation.message_for("amount").map(str::to_string),
            },
            "counter-form",
            SwapStrategy::Morph,
        )?;
        return session.render().await;
    };

    let value = state.store.add_to_counter(step);
    session
        .add_fragment(CounterValue { value }, "counter-value")?
        .add_model_fragment::<CounterForm>(
            CounterFormModel {
                amount: form.amount,
                error: None,
            },
            "counter-form",
            SwapStrategy::Morph,
        )?;
    session
        .render_with(RenderOptions {
            ignore_active_value_on_morph: true,
        })
        .await
}

async fn reset(State(state): State<AppState>, session: RenderSession) -> Response {
    state.store.reset_counter();
    client_redirect(session.facts(), "/counter")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(amount: &str) -> IncrementForm {
        IncrementForm {
            amount: amount.to_string(),
        }
    }

    #[test]
    fn steps_inside_the_range_are_accepted() {
        for amount in ["1", " 4 ", "10"] {
            assert!(form(amount).validate().is_valid(), "amount {amount:?}");
        }
    }

    #[test]
    fn out_of_range_and_garbage_steps_are_rejected() {
        let validation = form("11").validate();
        assert_eq!(
            validation.message_for("amount"),
            Some("Choose a step between 1 and 10")
        );

        let validation = form("two").validate();
        assert_eq!(validation.message_for("amount"), Some("Enter a whole number"));
        assert_eq!(validation.errors().len(), 1);
    }
}
