//! Queue coordinator: runs items through the channel and auto-continues.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::channel::{
    CancelFlag, ExecutionChannel, ExecutionResult, InputReply, RunOutcome,
};
use crate::config::QueueConfig;
use crate::directive::CommandSuggestion;
use crate::error::QueueError;
use crate::events::{ConsoleEvent, EventSink, QueueEvent};
use crate::outbound::{MessageOrigin, OutboundMessage, OutboundSender};

use super::item::{ItemStatus, Outstanding, Queue, QueueId, QueueItem, SKIPPED_OUTPUT};
use super::report::build_report;

/// A command card as it is still visible on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCard {
    pub command: String,
    pub server: String,
    /// Status label as displayed, e.g. `executed`.
    pub status_label: String,
    pub output: Option<String>,
}

/// Read access to rendered cards, used to recover lost queue state.
pub trait RenderedCards {
    fn cards_for(&self, queue_id: &QueueId) -> Vec<RenderedCard>;
}

/// Owns every batch of the conversation and the auto-continue ledger.
pub struct QueueCoordinator {
    channel: Arc<dyn ExecutionChannel>,
    cancel: CancelFlag,
    outbound: OutboundSender,
    events: EventSink,
    queues: HashMap<QueueId, Queue>,
    active: Option<QueueId>,
    continued: HashSet<QueueId>,
    next_queue: u64,
    head_chars: usize,
    tail_chars: usize,
}

impl QueueCoordinator {
    pub fn new(
        channel: Arc<dyn ExecutionChannel>,
        cancel: CancelFlag,
        outbound: OutboundSender,
        events: EventSink,
        config: &QueueConfig,
    ) -> Self {
        Self {
            channel,
            cancel,
            outbound,
            events,
            queues: HashMap::new(),
            active: None,
            continued: HashSet::new(),
            next_queue: 1,
            head_chars: config.output_head_chars,
            tail_chars: config.output_tail_chars,
        }
    }

    pub fn active_queue_id(&self) -> Option<&QueueId> {
        self.active.as_ref()
    }

    pub fn queue(&self, queue_id: &QueueId) -> Option<&Queue> {
        self.queues.get(queue_id)
    }

    pub fn has_continued(&self, queue_id: &QueueId) -> bool {
        self.continued.contains(queue_id)
    }

    /// Create a batch and make it the active one.
    pub fn open_batch(&mut self, suggestions: Vec<CommandSuggestion>) -> QueueId {
        let queue_id = QueueId(format!("q{}", self.next_queue));
        self.next_queue += 1;

        if let Some(previous) = self.active.as_ref().and_then(|id| self.queues.get(id)) {
            if !previous.is_settled() {
                debug!(queue = %previous.id, "batch replaced with items still pending");
            }
        }

        let items = suggestions
            .into_iter()
            .enumerate()
            .map(|(idx, suggestion)| QueueItem::from_suggestion(idx as u32 + 1, suggestion))
            .collect::<Vec<_>>();
        let queue = Queue::new(queue_id.clone(), items);
        self.events.emit(ConsoleEvent::Queue(QueueEvent::Opened {
            queue_id: queue_id.clone(),
            items: queue.views(),
        }));
        self.queues.insert(queue_id.clone(), queue);
        self.active = Some(queue_id.clone());
        queue_id
    }

    fn queue_mut(&mut self, queue_id: &QueueId) -> Result<&mut Queue, QueueError> {
        self.queues
            .get_mut(queue_id)
            .ok_or_else(|| QueueError::UnknownQueue(queue_id.to_string()))
    }

    fn pending_item(&self, queue_id: &QueueId, item_id: u32) -> Result<&QueueItem, QueueError> {
        let queue = self
            .queues
            .get(queue_id)
            .ok_or_else(|| QueueError::UnknownQueue(queue_id.to_string()))?;
        let item = queue.item(item_id).ok_or_else(|| QueueError::UnknownItem {
            queue: queue_id.to_string(),
            item: item_id.to_string(),
        })?;
        if !item.is_pending() {
            return Err(QueueError::NotPending {
                queue: queue_id.to_string(),
                item: item_id.to_string(),
            });
        }
        Ok(item)
    }

    /// Run one pending item through the channel.
    ///
    /// Channel-unavailable is returned as an error with the item untouched.
    pub async fn execute(
        &mut self,
        queue_id: &QueueId,
        item_id: u32,
    ) -> Result<RunOutcome, QueueError> {
        let item = self.pending_item(queue_id, item_id)?;
        let command = item.command.clone();
        let target = item.server.clone();

        self.cancel.clear();
        let outcome = self.channel.run(&command, &target, &self.cancel).await?;

        let queue = self.queue_mut(queue_id)?;
        queue.outstanding.remove(&item_id);
        match &outcome {
            RunOutcome::Finished(result) => {
                self.settle_executed(queue_id, item_id, result.clone())?;
            }
            RunOutcome::TimedOut { partial, resume } => {
                queue
                    .outstanding
                    .insert(item_id, Outstanding::Capture(resume.clone()));
                self.events
                    .emit(ConsoleEvent::Queue(QueueEvent::NeedsManualCapture {
                        queue_id: queue_id.clone(),
                        item_id,
                        partial_output: partial.output.clone(),
                    }));
            }
            RunOutcome::Cancelled => {
                debug!(queue = %queue_id, item_id, "run cancelled; item stays pending");
            }
            RunOutcome::Interactive(process) => {
                queue
                    .outstanding
                    .insert(item_id, Outstanding::Interactive(process.clone()));
                self.events.emit(ConsoleEvent::Queue(QueueEvent::AwaitingInput {
                    queue_id: queue_id.clone(),
                    item_id,
                    process_id: process.process_id.clone(),
                    output: process.output.clone(),
                }));
            }
        }
        self.maybe_auto_continue(queue_id);
        Ok(outcome)
    }

    /// Capture a timed-out item now and mark it executed.
    pub async fn complete_capture(
        &mut self,
        queue_id: &QueueId,
        item_id: u32,
    ) -> Result<ExecutionResult, QueueError> {
        self.pending_item(queue_id, item_id)?;
        let cursor = match self.queue_mut(queue_id)?.outstanding.get(&item_id) {
            Some(Outstanding::Capture(cursor)) => cursor.clone(),
            _ => {
                return Err(QueueError::NothingOutstanding {
                    queue: queue_id.to_string(),
                    item: item_id.to_string(),
                })
            }
        };

        let result = self.channel.capture_now(&cursor).await?;
        self.queue_mut(queue_id)?.outstanding.remove(&item_id);
        self.settle_executed(queue_id, item_id, result.clone())?;
        self.maybe_auto_continue(queue_id);
        Ok(result)
    }

    /// Forward one line to an item's interactive process.
    pub async fn send_input(
        &mut self,
        queue_id: &QueueId,
        item_id: u32,
        text: &str,
    ) -> Result<InputReply, QueueError> {
        self.pending_item(queue_id, item_id)?;
        let process = match self.queue_mut(queue_id)?.outstanding.get(&item_id) {
            Some(Outstanding::Interactive(process)) => process.clone(),
            _ => {
                return Err(QueueError::NothingOutstanding {
                    queue: queue_id.to_string(),
                    item: item_id.to_string(),
                })
            }
        };

        let reply = self.channel.send_input(&process, text).await?;
        let mut transcript = process.output.clone();
        if !reply.output.is_empty() {
            if !transcript.is_empty() && !transcript.ends_with('\n') {
                transcript.push('\n');
            }
            transcript.push_str(&reply.output);
        }

        if reply.completed {
            self.queue_mut(queue_id)?.outstanding.remove(&item_id);
            self.settle_executed(
                queue_id,
                item_id,
                ExecutionResult {
                    output: transcript,
                    exit_code: reply.exit_code,
                    timed_out: false,
                },
            )?;
            self.maybe_auto_continue(queue_id);
        } else {
            let mut updated = process;
            updated.output = transcript;
            self.events.emit(ConsoleEvent::Queue(QueueEvent::AwaitingInput {
                queue_id: queue_id.clone(),
                item_id,
                process_id: updated.process_id.clone(),
                output: reply.output.clone(),
            }));
            self.queue_mut(queue_id)?
                .outstanding
                .insert(item_id, Outstanding::Interactive(updated));
        }
        Ok(reply)
    }

    pub fn skip(&mut self, queue_id: &QueueId, item_id: u32) -> Result<(), QueueError> {
        self.pending_item(queue_id, item_id)?;
        self.skip_unchecked(queue_id, item_id)?;
        self.maybe_auto_continue(queue_id);
        Ok(())
    }

    /// Skip every pending item; returns how many were skipped.
    pub fn skip_all(&mut self, queue_id: &QueueId) -> Result<usize, QueueError> {
        let pending = self
            .queues
            .get(queue_id)
            .ok_or_else(|| QueueError::UnknownQueue(queue_id.to_string()))?
            .items
            .iter()
            .filter(|item| item.is_pending())
            .map(|item| item.id)
            .collect::<Vec<_>>();
        for item_id in &pending {
            self.skip_unchecked(queue_id, *item_id)?;
        }
        self.maybe_auto_continue(queue_id);
        Ok(pending.len())
    }

    fn skip_unchecked(&mut self, queue_id: &QueueId, item_id: u32) -> Result<(), QueueError> {
        let queue = self.queue_mut(queue_id)?;
        queue.outstanding.remove(&item_id);
        let item = queue.item_mut(item_id).ok_or_else(|| QueueError::UnknownItem {
            queue: queue_id.to_string(),
            item: item_id.to_string(),
        })?;
        item.mark_skipped();
        self.events.emit(ConsoleEvent::Queue(QueueEvent::ItemUpdated {
            queue_id: queue_id.clone(),
            item_id,
            status: ItemStatus::Skipped,
            exit_code: None,
        }));
        Ok(())
    }

    fn settle_executed(
        &mut self,
        queue_id: &QueueId,
        item_id: u32,
        result: ExecutionResult,
    ) -> Result<(), QueueError> {
        let queue = self.queue_mut(queue_id)?;
        let item = queue.item_mut(item_id).ok_or_else(|| QueueError::UnknownItem {
            queue: queue_id.to_string(),
            item: item_id.to_string(),
        })?;
        let exit_code = result.exit_code;
        let success = result.succeeded();
        item.mark_executed(result);
        let reference = item.command.clone();
        self.events.emit(ConsoleEvent::Queue(QueueEvent::ItemUpdated {
            queue_id: queue_id.clone(),
            item_id,
            status: ItemStatus::Executed,
            exit_code,
        }));
        self.events.feedback(reference, success);
        Ok(())
    }

    /// Send the aggregated report once the active batch is settled.
    ///
    /// Fires at most once per queue id; returns whether it fired now.
    pub fn maybe_auto_continue(&mut self, queue_id: &QueueId) -> bool {
        if self.continued.contains(queue_id) || self.active.as_ref() != Some(queue_id) {
            return false;
        }
        let Some(queue) = self.queues.get(queue_id) else {
            return false;
        };
        if queue.items.is_empty() || !queue.is_settled() {
            return false;
        }

        let text = build_report(queue, self.head_chars, self.tail_chars);
        self.continued.insert(queue_id.clone());
        let message = OutboundMessage {
            text,
            origin: MessageOrigin::QueueReport {
                queue_id: queue_id.clone(),
            },
        };
        if self.outbound.send(message).is_err() {
            warn!(queue = %queue_id, "outbound receiver closed; report dropped");
        }
        info!(queue = %queue_id, "batch settled; report sent");
        self.events.emit(ConsoleEvent::Queue(QueueEvent::AutoContinued {
            queue_id: queue_id.clone(),
        }));
        true
    }

    /// Rebuild a lost or empty batch from its rendered cards.
    ///
    /// Returns `Ok(false)` when the in-memory batch still has items.
    pub fn reconstruct_from_display(
        &mut self,
        queue_id: &QueueId,
        cards: &dyn RenderedCards,
    ) -> Result<bool, QueueError> {
        if self
            .queues
            .get(queue_id)
            .is_some_and(|queue| !queue.items.is_empty())
        {
            return Ok(false);
        }

        let rendered = cards.cards_for(queue_id);
        if rendered.is_empty() {
            return Err(QueueError::NothingToReconstruct(queue_id.to_string()));
        }

        let items = rendered
            .into_iter()
            .enumerate()
            .map(|(idx, card)| {
                let status = ItemStatus::from_label(&card.status_label).unwrap_or(ItemStatus::Pending);
                let output = match status {
                    ItemStatus::Skipped => Some(SKIPPED_OUTPUT.to_string()),
                    _ => card.output,
                };
                QueueItem {
                    id: idx as u32 + 1,
                    server: card.server,
                    command: card.command,
                    explanation: String::new(),
                    status,
                    output,
                    exit_code: None,
                }
            })
            .collect::<Vec<_>>();
        info!(queue = %queue_id, items = items.len(), "batch rebuilt from rendered cards");

        let queue = Queue::new(queue_id.clone(), items);
        self.events.emit(ConsoleEvent::Queue(QueueEvent::Reconstructed {
            queue_id: queue_id.clone(),
            items: queue.views(),
        }));
        self.queues.insert(queue_id.clone(), queue);
        if self.active.is_none() {
            self.active = Some(queue_id.clone());
        }
        self.maybe_auto_continue(queue_id);
        Ok(true)
    }
}
