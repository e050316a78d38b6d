//! Scripted in-memory target
//!
//! Records every call in order. Form listings are scripted per event: each
//! poll consumes the next listing and the final one repeats forever. Write
//! calls answer `SUCCESS` unless a response or error was queued.

use edcm_migrate::services::edc_client::{
    ActionResponse, EdcApi, EdcError, EventDateEntry, EventScope, FormEntry, FormItemsEntry,
    ItemGroupEntry, SessionToken,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One observed call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Authenticate { username: String },
    SetEventDate { event: String, date: String },
    TriggerForms { event: String, forms: Vec<String> },
    GetForms { event: String },
    PostItems { event: String, forms: Vec<FormItemsEntry> },
    SubmitForms { event: String, forms: Vec<String> },
    CreateItemGroup { event: String, form: String, item_group: String },
}

type Reply = Result<ActionResponse, EdcError>;

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    form_polls: HashMap<String, VecDeque<Vec<String>>>,
    auth_error: Option<EdcError>,
    get_forms_error: Option<EdcError>,
    event_date_replies: VecDeque<Reply>,
    post_replies: VecDeque<Reply>,
    submit_replies: VecDeque<Reply>,
    create_replies: VecDeque<Reply>,
}

/// Cloneable handle; clones share state
#[derive(Clone, Default)]
pub struct FakeEdc {
    state: Arc<Mutex<State>>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl FakeEdc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successive form listings for `event`
    pub fn script_forms(&self, event: &str, polls: &[&[&str]]) {
        let polls = polls.iter().map(|p| names(p)).collect();
        self.state
            .lock()
            .unwrap()
            .form_polls
            .insert(event.to_string(), polls);
    }

    pub fn fail_authentication(&self, error: EdcError) {
        self.state.lock().unwrap().auth_error = Some(error);
    }

    pub fn fail_get_forms(&self, error: EdcError) {
        self.state.lock().unwrap().get_forms_error = Some(error);
    }

    pub fn queue_event_date_reply(&self, reply: Reply) {
        self.state.lock().unwrap().event_date_replies.push_back(reply);
    }

    pub fn queue_post_reply(&self, reply: Reply) {
        self.state.lock().unwrap().post_replies.push_back(reply);
    }

    pub fn queue_submit_reply(&self, reply: Reply) {
        self.state.lock().unwrap().submit_replies.push_back(reply);
    }

    pub fn queue_create_reply(&self, reply: Reply) {
        self.state.lock().unwrap().create_replies.push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn get_forms_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::GetForms { .. }))
            .count()
    }

    /// Payloads of every item post, in order
    pub fn posts(&self) -> Vec<Vec<FormItemsEntry>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostItems { forms, .. } => Some(forms),
                _ => None,
            })
            .collect()
    }

    /// Form names of every submit call, in order
    pub fn submits(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SubmitForms { forms, .. } => Some(forms),
                _ => None,
            })
            .collect()
    }

    /// (form, item group) of every creation call, in order
    pub fn creations(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateItemGroup { form, item_group, .. } => Some((form, item_group)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn next_reply(queue: &mut VecDeque<Reply>) -> Reply {
        queue.pop_front().unwrap_or_else(|| Ok(ActionResponse::success()))
    }
}

fn form_names(forms: &[FormEntry]) -> Vec<String> {
    forms.iter().map(|f| f.form_name.clone()).collect()
}

#[async_trait::async_trait]
impl EdcApi for FakeEdc {
    async fn authenticate(&self, username: &str, _password: &str) -> Result<SessionToken, EdcError> {
        self.record(Call::Authenticate {
            username: username.to_string(),
        });
        match self.state.lock().unwrap().auth_error.clone() {
            Some(error) => Err(error),
            None => Ok(SessionToken::new("FAKE-SESSION")),
        }
    }

    async fn set_event_date(
        &self,
        _token: &SessionToken,
        _study: &str,
        entry: &EventDateEntry,
    ) -> Result<ActionResponse, EdcError> {
        self.record(Call::SetEventDate {
            event: entry.scope.event_name.clone(),
            date: entry.date.clone(),
        });
        Self::next_reply(&mut self.state.lock().unwrap().event_date_replies)
    }

    async fn trigger_forms(
        &self,
        _token: &SessionToken,
        _study: &str,
        forms: &[FormEntry],
    ) -> Result<ActionResponse, EdcError> {
        self.record(Call::TriggerForms {
            event: forms.first().map(|f| f.scope.event_name.clone()).unwrap_or_default(),
            forms: form_names(forms),
        });
        Ok(ActionResponse::success())
    }

    async fn get_forms(
        &self,
        _token: &SessionToken,
        _study: &str,
        scope: &EventScope,
    ) -> Result<Vec<String>, EdcError> {
        self.record(Call::GetForms {
            event: scope.event_name.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.get_forms_error.clone() {
            return Err(error);
        }
        let Some(polls) = state.form_polls.get_mut(&scope.event_name) else {
            return Ok(Vec::new());
        };
        let listing = if polls.len() > 1 {
            polls.pop_front().unwrap_or_default()
        } else {
            polls.front().cloned().unwrap_or_default()
        };
        Ok(listing)
    }

    async fn post_items(
        &self,
        _token: &SessionToken,
        _study: &str,
        forms: &[FormItemsEntry],
    ) -> Result<ActionResponse, EdcError> {
        self.record(Call::PostItems {
            event: forms.first().map(|f| f.scope.event_name.clone()).unwrap_or_default(),
            forms: forms.to_vec(),
        });
        Self::next_reply(&mut self.state.lock().unwrap().post_replies)
    }

    async fn submit_forms(
        &self,
        _token: &SessionToken,
        _study: &str,
        forms: &[FormEntry],
    ) -> Result<ActionResponse, EdcError> {
        self.record(Call::SubmitForms {
            event: forms.first().map(|f| f.scope.event_name.clone()).unwrap_or_default(),
            forms: form_names(forms),
        });
        Self::next_reply(&mut self.state.lock().unwrap().submit_replies)
    }

    async fn create_item_group(
        &self,
        _token: &SessionToken,
        _study: &str,
        entry: &ItemGroupEntry,
    ) -> Result<ActionResponse, EdcError> {
        self.record(Call::CreateItemGroup {
            event: entry.scope.event_name.clone(),
            form: entry.form_name.clone(),
            item_group: entry.itemgroup_name.clone(),
        });
        Self::next_reply(&mut self.state.lock().unwrap().create_replies)
    }
}
