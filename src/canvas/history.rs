use crate::canvas::debounce::Debouncer;
use crate::canvas::model::{Image, Stroke};
use anyhow::Result;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Document mutation recorded for undo/redo.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAction {
    AddStrokes(Vec<Stroke>),
    RemoveStrokes(Vec<Stroke>),
    AddImages(Vec<Image>),
    RemoveImages(Vec<Image>),
}

impl HistoryAction {
    pub fn inverse(&self) -> HistoryAction {
        match self {
            HistoryAction::AddStrokes(strokes) => HistoryAction::RemoveStrokes(strokes.clone()),
            HistoryAction::RemoveStrokes(strokes) => HistoryAction::AddStrokes(strokes.clone()),
            HistoryAction::AddImages(images) => HistoryAction::RemoveImages(images.clone()),
            HistoryAction::RemoveImages(images) => HistoryAction::AddImages(images.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryOp {
    pub id: u64,
    pub action: HistoryAction,
}

/// Everything enqueued between two commits, in enqueue order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryEntry {
    pub ops: Vec<HistoryOp>,
}

impl HistoryEntry {
    pub fn operation_ids(&self) -> Vec<u64> {
        self.ops.iter().map(|op| op.id).collect()
    }

    /// Actions that revert the entry, last operation first.
    pub fn undo_actions(&self) -> Vec<HistoryAction> {
        self.ops.iter().rev().map(|op| op.action.inverse()).collect()
    }

    pub fn redo_actions(&self) -> Vec<HistoryAction> {
        self.ops.iter().map(|op| op.action.clone()).collect()
    }
}

/// Undo/redo storage; receives exactly one entry per commit.
pub trait UndoStore: Send {
    fn push(&mut self, entry: HistoryEntry) -> Result<()>;
    fn undo(&mut self) -> Option<HistoryEntry>;
    fn redo(&mut self) -> Option<HistoryEntry>;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryUndoStore {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
}

impl MemoryUndoStore {
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.undo_stack
    }
}

impl UndoStore for MemoryUndoStore {
    fn push(&mut self, entry: HistoryEntry) -> Result<()> {
        self.undo_stack.push(entry);
        self.redo_stack.clear();
        Ok(())
    }

    fn undo(&mut self) -> Option<HistoryEntry> {
        let entry = self.undo_stack.pop()?;
        self.redo_stack.push(entry.clone());
        Some(entry)
    }

    fn redo(&mut self) -> Option<HistoryEntry> {
        let entry = self.redo_stack.pop()?;
        self.undo_stack.push(entry.clone());
        Some(entry)
    }
}

/// Lets the host keep a handle on the store the engine pushes into.
impl<S: UndoStore> UndoStore for Arc<Mutex<S>> {
    fn push(&mut self, entry: HistoryEntry) -> Result<()> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry)
    }

    fn undo(&mut self) -> Option<HistoryEntry> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .undo()
    }

    fn redo(&mut self) -> Option<HistoryEntry> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .redo()
    }
}

/// Completion handle for an immediate flush.
#[derive(Debug)]
pub struct FlushHandle {
    done: Receiver<()>,
}

impl FlushHandle {
    /// True once the flush committed, false on timeout or if the batcher went
    /// away first.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.try_recv().is_ok()
    }
}

/// Collects operations and commits them as one history entry after the
/// debounce window passes without a new operation, or right away when a
/// flush is requested.
pub struct HistoryBatcher {
    pending: Vec<HistoryOp>,
    next_id: u64,
    debounce: Debouncer,
    flush_requested: bool,
    waiters: Vec<Sender<()>>,
    store: Box<dyn UndoStore>,
}

impl std::fmt::Debug for HistoryBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryBatcher")
            .field("pending", &self.pending.len())
            .field("next_id", &self.next_id)
            .field("flush_requested", &self.flush_requested)
            .finish()
    }
}

impl HistoryBatcher {
    pub fn new(store: Box<dyn UndoStore>, debounce: Duration) -> Self {
        Self {
            pending: Vec::new(),
            next_id: 1,
            debounce: Debouncer::new(debounce),
            flush_requested: false,
            waiters: Vec::new(),
            store,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn set_debounce(&mut self, window: Duration) {
        self.debounce.set_window(window);
    }

    /// Queues `action` and restarts the debounce window. Returns the
    /// operation id.
    pub fn enqueue(&mut self, action: HistoryAction, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(HistoryOp { id, action });
        self.debounce.poke(now);
        id
    }

    /// Pushes everything pending as one entry. No-op when nothing is pending.
    /// When the store rejects the entry the operations stay pending for the
    /// next commit and waiting flush handles report failure.
    pub fn commit(&mut self) -> Result<Option<HistoryEntry>> {
        self.debounce.cancel();
        self.flush_requested = false;
        if self.pending.is_empty() {
            self.release_waiters();
            return Ok(None);
        }
        let entry = HistoryEntry {
            ops: self.pending.clone(),
        };
        tracing::debug!(operations = ?entry.operation_ids(), "history commit");
        if let Err(err) = self.store.push(entry.clone()) {
            self.waiters.clear();
            return Err(err.context("push history entry"));
        }
        self.pending.clear();
        self.release_waiters();
        Ok(Some(entry))
    }

    /// Asks for a commit on the next [`Self::poll`]; the handle completes when
    /// it happens.
    pub fn request_flush(&mut self) -> FlushHandle {
        let (tx, rx) = channel();
        if self.pending.is_empty() {
            let _ = tx.send(());
        } else {
            self.flush_requested = true;
            self.waiters.push(tx);
        }
        FlushHandle { done: rx }
    }

    pub fn flush_requested(&self) -> bool {
        self.flush_requested
    }

    /// Commits when a flush was requested or the debounce window elapsed.
    pub fn poll(&mut self, now: Instant) -> Result<Option<HistoryEntry>> {
        if self.flush_requested || self.debounce.due(now) {
            return self.commit();
        }
        Ok(None)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn undo(&mut self) -> Result<Option<HistoryEntry>> {
        self.commit()?;
        Ok(self.store.undo())
    }

    pub fn redo(&mut self) -> Result<Option<HistoryEntry>> {
        self.commit()?;
        Ok(self.store.redo())
    }

    fn release_waiters(&mut self) {
        for tx in self.waiters.drain(..) {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::{Color, DocumentPoint, PageId, Pen};

    type SharedStore = Arc<Mutex<MemoryUndoStore>>;

    fn stroke(x: f32) -> Stroke {
        let point = DocumentPoint {
            x,
            y: 10.0,
            pressure: 1.0,
            size: 2.0,
            ..DocumentPoint::default()
        };
        Stroke::new(PageId::from("p"), Pen::Ballpen, Color::BLACK, 2.0, vec![point]).expect("stroke")
    }

    fn batcher() -> (HistoryBatcher, SharedStore) {
        let store = SharedStore::default();
        let batcher = HistoryBatcher::new(Box::new(Arc::clone(&store)), Duration::from_millis(500));
        (batcher, store)
    }

    #[test]
    fn enqueues_inside_window_coalesce_into_one_entry() {
        let (mut batcher, store) = batcher();
        let start = Instant::now();
        batcher.enqueue(HistoryAction::AddStrokes(vec![stroke(1.0)]), start);
        batcher.enqueue(
            HistoryAction::RemoveStrokes(vec![stroke(2.0)]),
            start + Duration::from_millis(300),
        );
        batcher.enqueue(
            HistoryAction::AddStrokes(vec![stroke(3.0)]),
            start + Duration::from_millis(600),
        );

        assert!(batcher.poll(start + Duration::from_millis(900)).expect("poll").is_none());
        let entry = batcher
            .poll(start + Duration::from_millis(1100))
            .expect("poll")
            .expect("entry");
        assert_eq!(entry.operation_ids(), vec![1, 2, 3]);

        let store = store.lock().expect("store");
        assert_eq!(store.undo_len(), 1);
        assert_eq!(store.entries()[0], entry);
    }

    #[test]
    fn empty_commit_is_a_no_op() {
        let (mut batcher, store) = batcher();
        assert!(batcher.commit().expect("commit").is_none());
        assert_eq!(store.lock().expect("store").undo_len(), 0);
    }

    #[test]
    fn flush_request_commits_on_next_poll_and_completes_handle() {
        let (mut batcher, store) = batcher();
        let start = Instant::now();
        batcher.enqueue(HistoryAction::AddStrokes(vec![stroke(1.0)]), start);
        let handle = batcher.request_flush();
        assert!(!handle.is_done());

        batcher.poll(start).expect("poll");
        assert!(handle.wait(Duration::from_millis(10)));
        assert_eq!(store.lock().expect("store").undo_len(), 1);
    }

    #[test]
    fn flush_with_nothing_pending_completes_immediately() {
        let (mut batcher, _) = batcher();
        assert!(batcher.request_flush().wait(Duration::from_millis(1)));
    }

    #[test]
    fn undo_flushes_pending_ops_first() {
        let (mut batcher, _) = batcher();
        batcher.enqueue(HistoryAction::AddStrokes(vec![stroke(1.0)]), Instant::now());
        let entry = batcher.undo().expect("undo").expect("entry");
        assert_eq!(entry.operation_ids(), vec![1]);
        assert_eq!(
            entry.undo_actions(),
            vec![HistoryAction::RemoveStrokes(vec![stroke_like(&entry)])]
        );
        assert!(batcher.redo().expect("redo").is_some());
    }

    fn stroke_like(entry: &HistoryEntry) -> Stroke {
        match &entry.ops[0].action {
            HistoryAction::AddStrokes(strokes) => strokes[0].clone(),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[derive(Default)]
    struct RejectFirstPush {
        rejected: bool,
        inner: MemoryUndoStore,
    }

    impl UndoStore for RejectFirstPush {
        fn push(&mut self, entry: HistoryEntry) -> Result<()> {
            if !self.rejected {
                self.rejected = true;
                anyhow::bail!("undo store unavailable");
            }
            self.inner.push(entry)
        }

        fn undo(&mut self) -> Option<HistoryEntry> {
            self.inner.undo()
        }

        fn redo(&mut self) -> Option<HistoryEntry> {
            self.inner.redo()
        }
    }

    #[test]
    fn rejected_commit_keeps_ops_for_the_next_one() {
        let store = Arc::new(Mutex::new(RejectFirstPush::default()));
        let mut batcher =
            HistoryBatcher::new(Box::new(Arc::clone(&store)), Duration::from_millis(500));
        batcher.enqueue(HistoryAction::AddStrokes(vec![stroke(1.0)]), Instant::now());
        let handle = batcher.request_flush();

        assert!(batcher.commit().is_err());
        assert_eq!(batcher.pending_len(), 1);
        assert!(!handle.wait(Duration::from_millis(10)));

        let entry = batcher.commit().expect("commit").expect("entry");
        assert_eq!(entry.operation_ids(), vec![1]);
        assert_eq!(batcher.pending_len(), 0);
        assert_eq!(store.lock().expect("store").inner.undo_len(), 1);
    }

    #[test]
    fn new_commit_clears_redo_stack() {
        let mut store = MemoryUndoStore::default();
        store.push(HistoryEntry::default()).expect("push");
        let _ = store.undo();
        assert_eq!(store.redo_len(), 1);
        store.push(HistoryEntry::default()).expect("push");
        assert_eq!(store.redo_len(), 0);
        assert_eq!(store.undo_len(), 1);
    }
}
