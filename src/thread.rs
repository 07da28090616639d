//! Email thread classification

use crate::client::MailSource;
use crate::error::Result;
use crate::message::EmailMessage;
use crate::models::{Criteria, MessageRow, ThreadRef};

/// Fetch state of a thread's messages
#[derive(Debug, Clone)]
pub enum FetchState {
    Unfetched,
    Fetched(Vec<EmailMessage>),
}

/// A thread from a search result, fetched lazily
#[derive(Debug, Clone)]
pub struct EmailThread {
    id: String,
    state: FetchState,
}

impl EmailThread {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: FetchState::Unfetched,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self.state, FetchState::Fetched(_))
    }

    /// Fetch and classify the thread's messages
    ///
    /// Only the first call reaches `source`; later calls return the cached list.
    pub async fn fetch_messages(
        &mut self,
        source: &dyn MailSource,
        criteria: &Criteria,
    ) -> Result<&[EmailMessage]> {
        if let FetchState::Unfetched = self.state {
            let raw = source.get_thread(&self.id).await?;
            tracing::debug!("Fetched thread {} ({} messages)", self.id, raw.len());
            let messages = raw
                .into_iter()
                .map(|message| EmailMessage::new(message, criteria))
                .collect();
            self.state = FetchState::Fetched(messages);
        }

        Ok(self.messages().unwrap_or_default())
    }

    pub fn messages(&self) -> Option<&[EmailMessage]> {
        match &self.state {
            FetchState::Unfetched => None,
            FetchState::Fetched(messages) => Some(messages),
        }
    }

    /// Every message qualifies; empty or unfetched threads never do
    pub fn should_include(&self) -> bool {
        match self.messages() {
            Some(messages) => {
                !messages.is_empty() && messages.iter().all(EmailMessage::should_include)
            }
            None => false,
        }
    }

    pub fn to_rows(&self) -> Option<Vec<MessageRow>> {
        self.messages()
            .map(|messages| messages.iter().map(EmailMessage::to_row).collect())
    }
}

impl From<ThreadRef> for EmailThread {
    fn from(thread: ThreadRef) -> Self {
        Self::new(thread.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, MessageHeader, RawMessage, ThreadPage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        messages: Vec<RawMessage>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MailSource for CountingSource {
        async fn list_threads(
            &self,
            _query: &str,
            _max_results: u32,
            _page_token: Option<String>,
        ) -> Result<ThreadPage> {
            Ok(ThreadPage::default())
        }

        async fn get_thread(&self, _thread_id: &str) -> Result<Vec<RawMessage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.messages.clone())
        }
    }

    fn criteria() -> Criteria {
        Criteria::new(Identity::new("u@h.com", true).unwrap())
    }

    fn raw(from: &str, to: &str) -> RawMessage {
        RawMessage {
            id: None,
            headers: vec![MessageHeader::new("From", from), MessageHeader::new("To", to)],
            internal_date_millis: Some(1_592_222_400_000),
        }
    }

    fn source(messages: Vec<RawMessage>) -> CountingSource {
        CountingSource {
            messages,
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_unfetched_thread() {
        let thread = EmailThread::new("t1");
        assert!(!thread.is_fetched());
        assert!(thread.messages().is_none());
        assert!(thread.to_rows().is_none());
        assert!(!thread.should_include());
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent() {
        let source = source(vec![raw("v@h.com", "u@h.com")]);
        let criteria = criteria();
        let mut thread = EmailThread::new("t1");

        let first: Vec<String> = thread
            .fetch_messages(&source, &criteria)
            .await
            .unwrap()
            .iter()
            .map(|m| m.to_row().from)
            .collect();
        let second: Vec<String> = thread
            .fetch_messages(&source, &criteria)
            .await
            .unwrap()
            .iter()
            .map(|m| m.to_row().from)
            .collect();

        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_messages_must_qualify() {
        let criteria = criteria();
        let qualifying = vec![
            raw("v@h.com", "u@h.com"),
            raw("u@h.com", "v@h.com"),
            raw("v@h.com", "u@h.com, w@h.com"),
        ];

        let mut thread = EmailThread::new("t1");
        thread.fetch_messages(&source(qualifying.clone()), &criteria).await.unwrap();
        assert!(thread.should_include());
        assert_eq!(thread.to_rows().unwrap().len(), 3);

        for index in 0..qualifying.len() {
            let mut messages = qualifying.clone();
            messages[index] = raw("v@h.com", "x@other.com");

            let mut thread = EmailThread::new("t1");
            thread.fetch_messages(&source(messages), &criteria).await.unwrap();
            assert!(!thread.should_include(), "message {} should exclude the thread", index);
        }
    }

    #[tokio::test]
    async fn test_empty_thread_excluded() {
        let mut thread = EmailThread::new("t1");
        thread.fetch_messages(&source(vec![]), &criteria()).await.unwrap();
        assert!(thread.is_fetched());
        assert!(!thread.should_include());
        assert_eq!(thread.to_rows(), Some(vec![]));
    }
}
