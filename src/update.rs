//! State update logic (Elm Architecture)

use log::{debug, info, warn};

use crate::command::{Command, EmptyState, Notification, ThreadChange};
use crate::heights::{Registration, TickReport};
use crate::index::PageRequest;
use crate::merge::PostOutcome;
use crate::message::Message;
use crate::model::ThreadModel;

pub fn update(model: &mut ThreadModel, msg: Message) -> Vec<Command> {
    let mut commands = Vec::new();
    if model.torn_down {
        debug!("screen torn down; ignoring {msg:?}");
        return commands;
    }

    match msg {
        // === Presentation requests ===
        Message::RequestReload => {
            if model.is_reloading {
                debug!("reload already in flight; dropping request");
                return commands;
            }
            model.reset();
            model.is_reloading = true;
            commands.push(Command::CancelHeightTick);
            set_empty_state(model, EmptyState::None, &mut commands);
            info!("reloading discussion {}", model.proxy_id);
            commands.push(Command::FetchProxy {
                generation: model.generation,
                proxy_id: model.proxy_id.clone(),
            });
        }

        Message::RequestLoadMoreTopLevel => {
            if model.is_reloading || model.pending_top_level {
                debug!("top-level page already in flight; dropping request");
                return commands;
            }
            let request = model
                .thread
                .next_top_level_request(model.config.top_level_page_size());
            if request.is_empty() {
                debug!("no more top-level comments to load");
                return commands;
            }
            model.pending_top_level = true;
            set_empty_state(model, EmptyState::None, &mut commands);
            commands.push(Command::FetchPage {
                generation: model.generation,
                request,
            });
        }

        Message::RequestLoadMoreReplies(parent) => {
            if model.is_reloading || model.pending_replies.contains(&parent) {
                debug!("reply page for {parent} already in flight; dropping request");
                return commands;
            }
            let request = model
                .thread
                .next_reply_request(parent, model.config.reply_page_size());
            if request.is_empty() {
                debug!("no more replies to load for {parent}");
                return commands;
            }
            model.pending_replies.insert(parent);
            set_empty_state(model, EmptyState::None, &mut commands);
            commands.push(Command::FetchPage {
                generation: model.generation,
                request,
            });
        }

        Message::PostComment { parent, body } => {
            commands.push(Command::PostComment {
                generation: model.generation,
                proxy_id: model.proxy_id.clone(),
                parent,
                body,
            });
        }

        Message::RegisterRow {
            comment_id,
            sampler,
        } => {
            if model.heights.register(comment_id, sampler) == Registration::Ignored {
                return commands;
            }
            if let Some(report) = model.heights.start() {
                apply_tick_report(model, report, &mut commands);
            }
        }

        Message::Teardown => {
            info!("tearing down discussion {}", model.proxy_id);
            model.reset();
            model.is_reloading = false;
            model.torn_down = true;
            commands.push(Command::CancelHeightTick);
        }

        // === Completions ===
        Message::ProxyLoaded { generation, result } => {
            if !model.is_current(generation) {
                debug!("dropping stale proxy response (generation {generation})");
                return commands;
            }
            match result {
                Ok(proxy) => {
                    info!(
                        "discussion {} lists {} threads",
                        proxy.id,
                        proxy.top_level_ids.len()
                    );
                    model.thread.set_top_level_ids(proxy.top_level_ids);
                    let request = model
                        .thread
                        .next_top_level_request(model.config.top_level_page_size());
                    if request.is_empty() {
                        finish_reload(model, &mut commands);
                    } else {
                        model.pending_top_level = true;
                        commands.push(Command::FetchPage {
                            generation,
                            request,
                        });
                    }
                }
                Err(err) => {
                    warn!("failed to load discussion {}: {err}", model.proxy_id);
                    fail_reload(model, &mut commands);
                }
            }
        }

        Message::PageLoaded {
            generation,
            request,
            result,
        } => {
            if !model.is_current(generation) {
                debug!("dropping stale page response (generation {generation})");
                return commands;
            }
            match &request {
                PageRequest::TopLevel(_) => model.pending_top_level = false,
                PageRequest::Replies { parent, .. } => {
                    model.pending_replies.remove(parent);
                }
            }
            let batch = match result {
                Ok(batch) => batch,
                Err(err) => {
                    warn!("failed to load {} comments: {err}", request.ids().len());
                    if model.is_reloading {
                        fail_reload(model, &mut commands);
                    } else {
                        set_empty_state(model, EmptyState::Error, &mut commands);
                    }
                    return commands;
                }
            };

            let outcome = model.thread.merge(&request, batch);
            if model.is_reloading && matches!(request, PageRequest::TopLevel(_)) {
                finish_reload(model, &mut commands);
                return commands;
            }

            let mut notified_parent = None;
            match request {
                // Sent even when every ID was omitted: the footer may have to go.
                PageRequest::TopLevel(_) => notify_change(
                    ThreadChange::InsertedTopLevel(outcome.inserted_top_level.clone()),
                    &mut commands,
                ),
                PageRequest::Replies { parent, .. } => {
                    notify_change(ThreadChange::UpdatedParent(parent), &mut commands);
                    notified_parent = Some(parent);
                }
            }
            for parent in outcome.updated_parents {
                if Some(parent) != notified_parent {
                    notify_change(ThreadChange::UpdatedParent(parent), &mut commands);
                }
            }
            let settled = model.settled_empty_state();
            set_empty_state(model, settled, &mut commands);
        }

        Message::CommentPosted {
            generation,
            parent,
            result,
        } => {
            if !model.is_current(generation) {
                debug!("dropping posted comment from generation {generation}");
                return commands;
            }
            match result {
                Ok(posted) => {
                    let id = posted.comment.id;
                    match model.thread.insert_posted(posted) {
                        PostOutcome::InsertedTopLevel => {
                            notify_change(ThreadChange::InsertedTopLevel(0..1), &mut commands);
                        }
                        PostOutcome::UpdatedParent(parent) => {
                            notify_change(ThreadChange::UpdatedParent(parent), &mut commands);
                        }
                        PostOutcome::Held => {
                            debug!("posted comment {id} waits for its parent");
                        }
                        PostOutcome::Dropped => {}
                    }
                    let settled = model.settled_empty_state();
                    set_empty_state(model, settled, &mut commands);
                }
                Err(err) => {
                    warn!("failed to post comment: {err}");
                    commands.push(Command::Notify(Notification::PostFailed {
                        parent,
                        error: err.to_string(),
                    }));
                }
            }
        }

        Message::HeightTick { generation } => {
            if let Some(report) = model.heights.tick(generation) {
                apply_tick_report(model, report, &mut commands);
            }
        }
    }

    commands
}

fn notify_change(change: ThreadChange, commands: &mut Vec<Command>) {
    commands.push(Command::Notify(Notification::ThreadChanged(change)));
}

fn set_empty_state(model: &mut ThreadModel, state: EmptyState, commands: &mut Vec<Command>) {
    if model.empty_state != state {
        model.empty_state = state;
        commands.push(Command::Notify(Notification::EmptyState(state)));
    }
}

/// Publishes the empty state before `Reloaded`.
fn finish_reload(model: &mut ThreadModel, commands: &mut Vec<Command>) {
    model.is_reloading = false;
    let settled = model.settled_empty_state();
    set_empty_state(model, settled, commands);
    notify_change(ThreadChange::Reloaded, commands);
}

fn fail_reload(model: &mut ThreadModel, commands: &mut Vec<Command>) {
    model.is_reloading = false;
    model.pending_top_level = false;
    set_empty_state(model, EmptyState::Error, commands);
    notify_change(ThreadChange::Reloaded, commands);
}

fn apply_tick_report(model: &ThreadModel, report: TickReport, commands: &mut Vec<Command>) {
    let TickReport {
        outcome,
        rearm,
        generation,
    } = report;
    if outcome.needs_relayout() {
        commands.push(Command::Notify(Notification::HeightsChanged(outcome.changed)));
    }
    if rearm {
        commands.push(Command::ScheduleHeightTick {
            generation,
            delay: model.config.height_tick_interval(),
        });
    }
}
