use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bind::ResourceConflictPolicy;
use super::stream::C2sStream;
use crate::error::BindError;

/// Capacity of the query queue.
pub const QUERY_QUEUE_CAPACITY: usize = 1024;

/// Mutations are applied one at a time; senders wait for room.
const MUTATION_QUEUE_CAPACITY: usize = 1;

/// Result of a mutation: the stream evicted by a bind, if any.
type Outcome = Result<Option<Arc<C2sStream>>, BindError>;

enum Mutation {
    Register(Arc<C2sStream>),
    Authenticate(Arc<C2sStream>),
    Bind {
        stream: Arc<C2sStream>,
        resource: String,
        policy: ResourceConflictPolicy,
    },
    Unregister(Arc<C2sStream>),
}

struct Request {
    mutation: Mutation,
    reply: oneshot::Sender<Outcome>,
}

enum Query {
    AvailableStreams {
        username: String,
        reply: oneshot::Sender<Vec<Arc<C2sStream>>>,
    },
    Stream {
        id: String,
        reply: oneshot::Sender<Option<Arc<C2sStream>>>,
    },
    Counts {
        reply: oneshot::Sender<(usize, usize)>,
    },
}

/// Streams known to the server, by id and, once bound, by username.
#[derive(Default)]
struct Index {
    streams: HashMap<String, Arc<C2sStream>>,
    users: HashMap<String, Vec<Arc<C2sStream>>>,
}

impl Index {
    fn register(&mut self, stream: Arc<C2sStream>) {
        self.streams.entry(stream.id().to_string()).or_insert(stream);
    }

    fn authenticate(&mut self, stream: Arc<C2sStream>) {
        let username = stream.username();
        if username.is_empty() {
            warn!(stream_id = %stream.id(), "authenticate requested for anonymous stream");
            return;
        }
        let resources = self.users.entry(username.to_string()).or_default();
        match resources.iter_mut().find(|s| s.id() == stream.id()) {
            Some(existing) => *existing = stream.clone(),
            None => resources.push(stream.clone()),
        }
        self.streams.insert(stream.id().to_string(), stream);
    }

    /// Claims `resource` for `stream` and files it under its username.
    ///
    /// The conflict lookup, the eviction and the insert happen in one step, so two streams of a
    /// user can never end up holding the same resource through this path.
    fn bind(&mut self, stream: Arc<C2sStream>, resource: &str, policy: ResourceConflictPolicy) -> Outcome {
        if stream.is_bound() {
            return Err(BindError::AlreadyBound);
        }
        let holder = self.users.get(stream.username()).and_then(|streams| {
            streams
                .iter()
                .find(|s| s.id() != stream.id() && s.resource() == resource)
                .cloned()
        });
        if let Some(ref holder) = holder {
            if policy == ResourceConflictPolicy::Reject {
                return Err(BindError::Conflict);
            }
            self.unregister(holder);
        }
        if !stream.mark_bound(resource) {
            return Err(BindError::AlreadyBound);
        }
        self.authenticate(stream);
        Ok(holder)
    }

    fn unregister(&mut self, stream: &C2sStream) {
        self.streams.remove(stream.id());
        let username = stream.username();
        let empty = match self.users.get_mut(username) {
            Some(resources) => {
                resources.retain(|s| s.id() != stream.id());
                resources.is_empty()
            }
            None => false,
        };
        if empty {
            self.users.remove(username);
        }
    }

    fn available_streams(&self, username: &str) -> Vec<Arc<C2sStream>> {
        self.users.get(username).cloned().unwrap_or_default()
    }
}

/// Handle to the stream registry task.
///
/// A single task owns the index and applies requests in arrival order, selecting fairly between
/// the query queue and the mutation queues. Each mutation resolves once it has been applied.
/// After the task stops every mutation is a no-op and every query returns nothing.
#[derive(Clone)]
pub struct StreamRegistry {
    register_tx: mpsc::Sender<Request>,
    authenticate_tx: mpsc::Sender<Request>,
    unregister_tx: mpsc::Sender<Request>,
    query_tx: mpsc::Sender<Query>,
}

impl StreamRegistry {
    /// Spawns the registry task. It runs until `cancel` fires or every handle is dropped.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(MUTATION_QUEUE_CAPACITY);
        let (authenticate_tx, authenticate_rx) = mpsc::channel(MUTATION_QUEUE_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(MUTATION_QUEUE_CAPACITY);
        let (query_tx, query_rx) = mpsc::channel(QUERY_QUEUE_CAPACITY);

        let task = tokio::spawn(Self::run(
            register_rx,
            authenticate_rx,
            unregister_rx,
            query_rx,
            cancel,
        ));
        let registry = StreamRegistry {
            register_tx: register_tx,
            authenticate_tx: authenticate_tx,
            unregister_tx: unregister_tx,
            query_tx: query_tx,
        };
        (registry, task)
    }

    /// Tracks a freshly accepted stream. Registering the same id twice keeps the first stream.
    pub async fn register(&self, stream: Arc<C2sStream>) {
        Self::mutate(&self.register_tx, Mutation::Register(stream)).await;
    }

    /// Files a stream under its username. A user may have any number of streams.
    pub async fn authenticate(&self, stream: Arc<C2sStream>) {
        Self::mutate(&self.authenticate_tx, Mutation::Authenticate(stream)).await;
    }

    /// Binds `resource` to an authenticated stream and files it under its username.
    ///
    /// A resource already held by another stream of the same user is refused with
    /// `BindError::Conflict` under `ResourceConflictPolicy::Reject`. Under `Override` the holder is
    /// unregistered and returned. A stopped registry only marks the stream bound.
    pub async fn bind(
        &self,
        stream: Arc<C2sStream>,
        resource: &str,
        policy: ResourceConflictPolicy,
    ) -> Result<Option<Arc<C2sStream>>, BindError> {
        let mutation = Mutation::Bind {
            stream: stream.clone(),
            resource: resource.to_string(),
            policy: policy,
        };
        match Self::mutate(&self.authenticate_tx, mutation).await {
            Some(outcome) => outcome,
            None if stream.mark_bound(resource) => Ok(None),
            None => Err(BindError::AlreadyBound),
        }
    }

    /// Forgets a stream. Safe to call at any point of the stream's life.
    pub async fn unregister(&self, stream: Arc<C2sStream>) {
        Self::mutate(&self.unregister_tx, Mutation::Unregister(stream)).await;
    }

    /// Snapshot of the authenticated streams of `username`.
    pub async fn available_streams(&self, username: &str) -> Vec<Arc<C2sStream>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let query = Query::AvailableStreams {
            username: username.to_string(),
            reply: reply_tx,
        };
        self.query(query, reply_rx).await.unwrap_or_default()
    }

    /// Looks up a registered stream by id.
    pub async fn stream(&self, id: &str) -> Option<Arc<C2sStream>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let query = Query::Stream {
            id: id.to_string(),
            reply: reply_tx,
        };
        self.query(query, reply_rx).await.flatten()
    }

    /// Number of registered streams.
    pub async fn stream_count(&self) -> usize {
        self.counts().await.0
    }

    /// Number of users with at least one authenticated stream.
    pub async fn user_count(&self) -> usize {
        self.counts().await.1
    }

    async fn counts(&self) -> (usize, usize) {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.query(Query::Counts { reply: reply_tx }, reply_rx)
            .await
            .unwrap_or_default()
    }

    /// Sends a mutation and waits until it has been applied. `None` once the task has stopped.
    async fn mutate(tx: &mpsc::Sender<Request>, mutation: Mutation) -> Option<Outcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            mutation: mutation,
            reply: reply_tx,
        };
        tx.send(request).await.ok()?;
        reply_rx.await.ok()
    }

    async fn query<T>(&self, query: Query, reply_rx: oneshot::Receiver<T>) -> Option<T> {
        self.query_tx.send(query).await.ok()?;
        reply_rx.await.ok()
    }

    async fn run(
        mut register_rx: mpsc::Receiver<Request>,
        mut authenticate_rx: mpsc::Receiver<Request>,
        mut unregister_rx: mpsc::Receiver<Request>,
        mut query_rx: mpsc::Receiver<Query>,
        cancel: CancellationToken,
    ) {
        info!("stream registry started");
        let mut index = Index::default();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stream registry shutting down");
                    break;
                }

                Some(request) = register_rx.recv() => Self::apply(&mut index, request),

                Some(request) = authenticate_rx.recv() => Self::apply(&mut index, request),

                Some(request) = unregister_rx.recv() => Self::apply(&mut index, request),

                Some(query) = query_rx.recv() => match query {
                    Query::AvailableStreams { username, reply } => {
                        let _ = reply.send(index.available_streams(&username));
                    }
                    Query::Stream { id, reply } => {
                        let _ = reply.send(index.streams.get(&id).cloned());
                    }
                    Query::Counts { reply } => {
                        let _ = reply.send((index.streams.len(), index.users.len()));
                    }
                },

                else => break,
            }
        }
        info!(streams = index.streams.len(), users = index.users.len(), "stream registry stopped");
    }

    fn apply(index: &mut Index, request: Request) {
        let outcome = match request.mutation {
            Mutation::Register(stream) => {
                debug!(stream_id = %stream.id(), "stream registered");
                index.register(stream);
                Ok(None)
            }
            Mutation::Authenticate(stream) => {
                debug!(stream_id = %stream.id(), username = %stream.username(), resource = %stream.resource(), "stream authenticated");
                index.authenticate(stream);
                Ok(None)
            }
            Mutation::Bind { stream, resource, policy } => {
                let stream_id = stream.id().to_string();
                let outcome = index.bind(stream, &resource, policy);
                match outcome {
                    Ok(ref replaced) => debug!(
                        stream_id = %stream_id,
                        resource = %resource,
                        replaced = ?replaced.as_ref().map(|s| s.id()),
                        "stream bound"
                    ),
                    Err(ref err) => debug!(stream_id = %stream_id, resource = %resource, error = %err, "bind refused"),
                }
                outcome
            }
            Mutation::Unregister(stream) => {
                debug!(stream_id = %stream.id(), "stream unregistered");
                index.unregister(&stream);
                Ok(None)
            }
        };
        // The requester may have gone away.
        let _ = request.reply.send(outcome);
    }
}
