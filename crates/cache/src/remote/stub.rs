//! Scripted remote client for tests
//!
//! Serves canned records, optionally fails every call with a scripted
//! error, and records call counts so tests can assert how often the remote
//! collaborator was consulted.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    EmailPatch, Page, RemoteClient, RemoteContact, RemoteEmail, RemoteEvent, RemoteFolder,
    RemoteResult, TimeWindow,
};
use crate::error::RemoteError;
use crate::models::{EmailId, EventId};
use crate::storage::EmailFilter;

/// A scripted stand-in for the remote provider
#[derive(Default)]
pub struct StubRemote {
    folders: Mutex<Vec<RemoteFolder>>,
    emails: Mutex<Vec<RemoteEmail>>,
    events: Mutex<Vec<RemoteEvent>>,
    contacts: Mutex<Vec<RemoteContact>>,
    /// When set, every call fails with a clone of this error
    fail_with: Mutex<Option<RemoteError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    patches: Mutex<Vec<(EmailId, EmailPatch)>>,
    deletions: Mutex<Vec<EmailId>>,
}

impl StubRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emails(emails: Vec<RemoteEmail>) -> Self {
        let stub = Self::new();
        *stub.emails.lock().unwrap() = emails;
        stub
    }

    pub fn push_email(&self, email: RemoteEmail) {
        self.emails.lock().unwrap().push(email);
    }

    pub fn set_folders(&self, folders: Vec<RemoteFolder>) {
        *self.folders.lock().unwrap() = folders;
    }

    pub fn set_events(&self, events: Vec<RemoteEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn set_contacts(&self, contacts: Vec<RemoteContact>) {
        *self.contacts.lock().unwrap() = contacts;
    }

    /// Make every subsequent call fail with `error`
    pub fn fail_with(&self, error: RemoteError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    /// Resume serving canned results
    pub fn succeed(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    /// How many times a method was called, by name
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Patches applied through `update_email`, in call order
    pub fn applied_patches(&self) -> Vec<(EmailId, EmailPatch)> {
        self.patches.lock().unwrap().clone()
    }

    /// Messages deleted through `delete_email`, in call order
    pub fn deleted(&self) -> Vec<EmailId> {
        self.deletions.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str) -> RemoteResult<()> {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
        match &*self.fail_with.lock().unwrap() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl RemoteClient for StubRemote {
    fn fetch_folders(&self) -> RemoteResult<Vec<RemoteFolder>> {
        self.record("fetch_folders")?;
        Ok(self.folders.lock().unwrap().clone())
    }

    fn fetch_emails(
        &self,
        filter: &EmailFilter,
        _cursor: Option<&str>,
    ) -> RemoteResult<Page<RemoteEmail>> {
        self.record("fetch_emails")?;
        let emails = self.emails.lock().unwrap();
        let items: Vec<RemoteEmail> = emails
            .iter()
            .filter(|e| {
                filter
                    .folder_id
                    .as_ref()
                    .is_none_or(|folder| &e.folder_id == folder)
            })
            .take(filter.limit)
            .cloned()
            .collect();
        Ok(Page::new(items, None))
    }

    fn fetch_email(&self, id: &EmailId) -> RemoteResult<RemoteEmail> {
        self.record("fetch_email")?;
        self.emails
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("no message {}", id.as_str())))
    }

    fn update_email(&self, id: &EmailId, patch: &EmailPatch) -> RemoteResult<()> {
        self.record("update_email")?;
        self.patches
            .lock()
            .unwrap()
            .push((id.clone(), patch.clone()));
        Ok(())
    }

    fn delete_email(&self, id: &EmailId) -> RemoteResult<()> {
        self.record("delete_email")?;
        self.deletions.lock().unwrap().push(id.clone());
        Ok(())
    }

    fn fetch_events(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        _cursor: Option<&str>,
    ) -> RemoteResult<Page<RemoteEvent>> {
        self.record("fetch_events")?;
        let events = self.events.lock().unwrap();
        let items: Vec<RemoteEvent> = events
            .iter()
            .filter(|e| e.calendar_id == calendar_id)
            .filter(|e| e.start < window.end && e.end > window.start)
            .cloned()
            .collect();
        Ok(Page::new(items, None))
    }

    fn create_event(&self, event: &RemoteEvent) -> RemoteResult<RemoteEvent> {
        self.record("create_event")?;
        self.events.lock().unwrap().push(event.clone());
        Ok(event.clone())
    }

    fn update_event(&self, event: &RemoteEvent) -> RemoteResult<RemoteEvent> {
        self.record("update_event")?;
        let mut events = self.events.lock().unwrap();
        if let Some(existing) = events
            .iter_mut()
            .find(|e| e.id == event.id && e.calendar_id == event.calendar_id)
        {
            *existing = event.clone();
            Ok(event.clone())
        } else {
            Err(RemoteError::not_found(format!("no event {}", event.id)))
        }
    }

    fn delete_event(&self, calendar_id: &str, id: &EventId) -> RemoteResult<()> {
        self.record("delete_event")?;
        self.events
            .lock()
            .unwrap()
            .retain(|e| !(e.calendar_id == calendar_id && e.id == id.as_str()));
        Ok(())
    }

    fn fetch_contacts(&self, _cursor: Option<&str>) -> RemoteResult<Page<RemoteContact>> {
        self.record("fetch_contacts")?;
        Ok(Page::new(self.contacts.lock().unwrap().clone(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_counts_calls_and_fails_on_demand() {
        let stub = StubRemote::new();
        assert!(stub.fetch_folders().is_ok());
        assert_eq!(stub.calls("fetch_folders"), 1);

        stub.fail_with(RemoteError::connectivity("down"));
        assert!(stub.fetch_folders().is_err());
        assert_eq!(stub.calls("fetch_folders"), 2);

        stub.succeed();
        assert!(stub.fetch_folders().is_ok());
    }
}
