//! Binding between the operator-facing surface and the request controller.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::client::ProvisionerApi;
use crate::controller::{
    status_message, Completion, Dispatch, Outcome, RequestController, RequestState, Severity,
};
use crate::input::InputState;
use crate::models::{Identity, OperationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Destroy,
}

impl Action {
    pub fn kind(self) -> OperationKind {
        match self {
            Action::Create => OperationKind::CreateServer,
            Action::Destroy => OperationKind::DestroyServer,
        }
    }
}

/// Everything a display needs to draw the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub user: String,
    pub device: String,
    pub busy: bool,
    pub actions_enabled: bool,
    pub status: String,
    pub severity: Option<Severity>,
}

pub fn render(identity: &Identity, state: &RequestState) -> PanelView {
    let busy = state.is_in_flight();
    PanelView {
        user: identity.user.clone(),
        device: identity.device.clone(),
        busy,
        actions_enabled: !busy,
        status: status_message(state),
        severity: state.outcome().map(Outcome::severity),
    }
}

pub struct Panel<A: ProvisionerApi + ?Sized> {
    input: InputState,
    controller: RequestController<A>,
}

impl<A: ProvisionerApi + ?Sized> Panel<A> {
    pub fn new(api: Arc<A>) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (controller, completions) = RequestController::new(api);
        (
            Self {
                input: InputState::new(),
                controller,
            },
            completions,
        )
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn set_user(&self, value: impl Into<String>) -> bool {
        self.input.set_user(value)
    }

    pub fn set_device(&self, value: impl Into<String>) -> bool {
        self.input.set_device(value)
    }

    pub fn actions_enabled(&self) -> bool {
        !self.controller.is_in_flight()
    }

    /// Runs an action. Disabled actions are ignored.
    pub fn invoke(&mut self, action: Action) -> Dispatch {
        if !self.actions_enabled() {
            return Dispatch::Ignored;
        }
        self.controller.trigger(action.kind(), &self.input)
    }

    pub fn on_completion(&mut self, completion: Completion) -> Option<Outcome> {
        self.controller.complete(completion)
    }

    pub fn state(&self) -> RequestState {
        self.controller.state()
    }

    pub fn view(&self) -> PanelView {
        render(&self.input.current_identity(), &self.controller.state())
    }

    pub fn subscribe(&self) -> PanelSubscription {
        PanelSubscription {
            identity: self.input.subscribe(),
            state: self.controller.subscribe(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Input,
    Request,
}

/// Observer over both the input fields and the request state.
pub struct PanelSubscription {
    identity: watch::Receiver<Identity>,
    state: watch::Receiver<RequestState>,
}

impl PanelSubscription {
    pub fn current(&mut self) -> PanelView {
        let identity = self.identity.borrow_and_update().clone();
        let state = self.state.borrow_and_update().clone();
        render(&identity, &state)
    }

    /// Waits for the next change. Returns `None` once the panel is dropped.
    pub async fn changed(&mut self) -> Option<(Change, PanelView)> {
        let (change, result) = tokio::select! {
            r = self.state.changed() => (Change::Request, r),
            r = self.identity.changed() => (Change::Input, r),
        };
        result.ok()?;
        Some((change, self.current()))
    }
}
