// src/services/session.rs
use std::{
    fmt::Debug,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures_util::{Stream, stream};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::UpstreamError;
use crate::message::ChatTurn;

/// The upstream generative chat capability.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the complete reply for the given ordered contents.
    async fn generate_content(&self, contents: &[ChatTurn]) -> Result<String, UpstreamError>;

    /// Start a streamed generation. Fragments are only fetched as the
    /// returned stream is polled.
    async fn stream_generate_content(
        &self,
        contents: &[ChatTurn],
        cancel: CancellationToken,
    ) -> Result<FragmentStream, UpstreamError>;
}

type BoxFragments = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// Lazy, finite sequence of reply fragments.
///
/// Ends early once its token is cancelled. Dropping the stream cancels the
/// token, so a producer watching it can release the upstream connection.
pub struct FragmentStream {
    inner: BoxFragments,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl FragmentStream {
    pub fn new<S>(inner: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Result<String, UpstreamError>> + Send + 'static,
    {
        let guard = cancel.clone().drop_guard();
        Self { inner: Box::pin(inner), cancel, _guard: guard }
    }

    pub fn from_fragments<I>(fragments: I, cancel: CancellationToken) -> Self
    where
        I: IntoIterator<Item = Result<String, UpstreamError>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(fragments), cancel)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Stream for FragmentStream {
    type Item = Result<String, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.inner.as_mut().poll_next(cx)
    }
}

/// Request-scoped binding between a history snapshot and the model.
pub struct ChatSession {
    model: Arc<dyn ChatModel>,
    history: Vec<ChatTurn>,
}

impl Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl ChatSession {
    pub fn open(model: Arc<dyn ChatModel>, history: Vec<ChatTurn>) -> Self {
        Self { model, history }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    // History followed by the new user turn.
    fn contents_with(&self, message: &str) -> Vec<ChatTurn> {
        let mut contents = Vec::with_capacity(self.history.len() + 1);
        contents.extend(self.history.iter().cloned());
        contents.push(ChatTurn::user(message));
        contents
    }

    pub async fn send_message(&self, message: &str) -> Result<String, UpstreamError> {
        let contents = self.contents_with(message);
        self.model.generate_content(&contents).await
    }

    pub async fn send_message_stream(
        self,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, UpstreamError> {
        let contents = self.contents_with(message);
        self.model.stream_generate_content(&contents, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<Vec<ChatTurn>>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn generate_content(&self, contents: &[ChatTurn]) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push(contents.to_vec());
            Ok("reply".to_string())
        }

        async fn stream_generate_content(
            &self,
            contents: &[ChatTurn],
            cancel: CancellationToken,
        ) -> Result<FragmentStream, UpstreamError> {
            self.seen.lock().unwrap().push(contents.to_vec());
            Ok(FragmentStream::from_fragments(
                vec![Ok("re".to_string()), Ok("ply".to_string())],
                cancel,
            ))
        }
    }

    #[tokio::test]
    async fn history_order_is_preserved_and_message_appended() {
        let model = Arc::new(RecordingModel::default());
        let history = vec![ChatTurn::user("a"), ChatTurn::model("b")];
        let session = ChatSession::open(model.clone(), history.clone());

        let reply = session.send_message("c").await.unwrap();
        assert_eq!(reply, "reply");
        assert_eq!(session.history(), history.as_slice());

        let seen = model.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            vec![ChatTurn::user("a"), ChatTurn::model("b"), ChatTurn::user("c")]
        );
    }

    #[tokio::test]
    async fn streamed_fragments_concatenate_to_reply() {
        let model = Arc::new(RecordingModel::default());
        let buffered = ChatSession::open(model.clone(), vec![])
            .send_message("hi")
            .await
            .unwrap();

        let stream = ChatSession::open(model, vec![])
            .send_message_stream("hi", CancellationToken::new())
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(fragments.concat(), buffered);
    }

    #[tokio::test]
    async fn cancelled_stream_yields_nothing_more() {
        let cancel = CancellationToken::new();
        let mut stream = FragmentStream::from_fragments(
            vec![Ok("1".to_string()), Ok("2".to_string())],
            cancel.clone(),
        );

        assert_eq!(stream.next().await.unwrap().unwrap(), "1");
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn dropping_stream_cancels_token() {
        let cancel = CancellationToken::new();
        let empty: Vec<Result<String, UpstreamError>> = Vec::new();
        let stream = FragmentStream::from_fragments(empty, cancel.clone());
        assert!(!cancel.is_cancelled());
        drop(stream);
        assert!(cancel.is_cancelled());
    }
}
