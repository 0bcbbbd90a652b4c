/*
 * Copyright (C) 2021 The Android Open Source Project
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Process-wide transaction routing: the node registry, proxy handle records,
//! the one-way work queues, and the worker thread pool.

use crate::binder::{IBinder, TransactionCode, TransactionFlags};
use crate::error::{Result, StatusCode};
use crate::native::{deliver_transaction, BinderObject};
use crate::parcel::Parcel;
use crate::proxy::{ProxyHandle, RecipientInner, SpIBinder};

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::thread;

/// Every binder node is identified by a process-unique handle. Handles are
/// never reused.
pub(crate) type Handle = u64;

const DEFAULT_MAX_THREADS: usize = 15;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);
static STATE: OnceLock<State> = OnceLock::new();

/// One registered binder node.
///
/// The object reference is weak: node records track identity and routing
/// state, while object ownership belongs to the local strong handles. The
/// canonical proxy record is also weak, pinned only by live proxy handles.
struct NodeRecord {
    object: Weak<dyn BinderObject>,
    proxy: Weak<ProxyHandle>,
    async_todo: VecDeque<AsyncTransaction>,
    // True while a NodeWork item for this node is queued or executing; keeps
    // one-way execution serialized per node.
    async_scheduled: bool,
}

/// A queued one-way transaction. Holds the target strong so the object
/// cannot be torn down before all of its accepted work has run.
struct AsyncTransaction {
    object: Arc<dyn BinderObject>,
    code: TransactionCode,
    data: Parcel,
    flags: TransactionFlags,
}

enum Work {
    /// Drain the one-way queue of the given node.
    NodeWork(Handle),
    /// Deliver death notifications.
    Obituary(Vec<Weak<RecipientInner>>),
}

#[derive(Default)]
struct WorkQueue {
    queue: VecDeque<Work>,
    in_flight: usize,
    // Threads currently blocked waiting for work.
    waiting: usize,
}

struct State {
    nodes: Mutex<HashMap<Handle, NodeRecord>>,
    work: Mutex<WorkQueue>,
    work_available: Condvar,
    max_threads: AtomicUsize,
    spawned_threads: AtomicUsize,
}

fn state() -> &'static State {
    STATE.get_or_init(|| State {
        nodes: Mutex::new(HashMap::new()),
        work: Mutex::new(WorkQueue::default()),
        work_available: Condvar::new(),
        max_threads: AtomicUsize::new(DEFAULT_MAX_THREADS),
        spawned_threads: AtomicUsize::new(0),
    })
}

/// Static utility functions to manage the process-wide binder transport
/// state.
pub struct ProcessState;

impl ProcessState {
    /// Start the background thread pool serving one-way transactions and
    /// death notifications. Idempotent.
    pub fn start_thread_pool() {
        let state = state();
        if state.spawned_threads.load(Ordering::Relaxed) == 0 {
            spawn_worker(state);
        }
    }

    /// Set the maximum number of threads the pool may spawn. The pool always
    /// runs at least one thread once started.
    pub fn set_thread_pool_max_thread_count(count: usize) {
        state().max_threads.store(count.max(1), Ordering::Relaxed);
    }

    /// Allocate the handle for a new binder node.
    pub(crate) fn next_handle() -> Handle {
        NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
    }

    /// Return the canonical proxy form of `binder`.
    ///
    /// At most one proxy record exists per node; all proxy handles for the
    /// node share it. Minting the first proxy registers the node record.
    pub(crate) fn proxy_for(binder: &SpIBinder) -> SpIBinder {
        match binder.local_object() {
            None => binder.clone(),
            Some(object) => {
                let handle = binder.handle();
                let state = state();
                let mut nodes = state.nodes.lock().unwrap();
                let record = nodes.entry(handle).or_insert_with(|| NodeRecord {
                    object: Arc::downgrade(&object),
                    proxy: Weak::new(),
                    async_todo: VecDeque::new(),
                    async_scheduled: false,
                });
                let proxy = match record.proxy.upgrade() {
                    Some(proxy) => proxy,
                    None => {
                        let proxy = ProxyHandle::new(handle);
                        record.proxy = Arc::downgrade(&proxy);
                        proxy
                    }
                };
                SpIBinder::from_proxy(proxy)
            }
        }
    }

    /// Upgrade the node's object reference, if the object is still alive.
    ///
    /// The returned strong reference also serves as a liveness guard: while
    /// it is held the node cannot die.
    pub(crate) fn node_object(handle: Handle) -> Option<Arc<dyn BinderObject>> {
        let nodes = state().nodes.lock().unwrap();
        nodes.get(&handle).and_then(|record| record.object.upgrade())
    }

    /// Whether a proxy record currently pins the node.
    pub(crate) fn proxy_alive(handle: Handle) -> bool {
        let nodes = state().nodes.lock().unwrap();
        nodes.get(&handle).map_or(false, |record| record.proxy.strong_count() > 0)
    }

    /// Deliver a transaction to the node behind `handle`.
    ///
    /// Synchronous transactions run on the calling thread. One-way
    /// transactions are queued in per-node FIFO order and return an empty
    /// reply immediately.
    pub(crate) fn transact(
        handle: Handle,
        code: TransactionCode,
        flags: TransactionFlags,
        data: Parcel,
    ) -> Result<Parcel> {
        let state = state();
        if flags & SpIBinder::FLAG_ONEWAY != 0 {
            let schedule = {
                let mut nodes = state.nodes.lock().unwrap();
                let record = nodes.get_mut(&handle).ok_or(StatusCode::DEAD_OBJECT)?;
                let object = record.object.upgrade().ok_or(StatusCode::DEAD_OBJECT)?;
                record.async_todo.push_back(AsyncTransaction { object, code, data, flags });
                // Setting the flag claims scheduling; the push itself can
                // happen after the registry lock is released.
                !mem::replace(&mut record.async_scheduled, true)
            };
            if schedule {
                push_work(state, Work::NodeWork(handle));
            }
            Ok(Parcel::new())
        } else {
            let object = Self::node_object(handle).ok_or(StatusCode::DEAD_OBJECT)?;
            deliver_transaction(&*object, code, &data, flags)
        }
    }

    /// Called when the backing object of a node is torn down. Queues death
    /// notifications for the node's proxy, if one is alive.
    pub(crate) fn node_destroyed(handle: Handle) {
        let state = state();
        // The upgraded proxy record must outlive the registry lock: if this
        // guard turns out to be the last strong reference, dropping it
        // re-enters the registry.
        let proxy;
        let recipients = {
            let mut nodes = state.nodes.lock().unwrap();
            let Some(record) = nodes.get_mut(&handle) else { return };
            proxy = record.proxy.upgrade();
            match &proxy {
                Some(proxy) => proxy.take_recipients(),
                None => {
                    nodes.remove(&handle);
                    Vec::new()
                }
            }
        };
        if !recipients.is_empty() {
            push_work(state, Work::Obituary(recipients));
        }
    }

    /// Called when the last proxy handle for a node is dropped. The node
    /// record stays as long as the local object is alive, or a drain of its
    /// one-way queue is still pending.
    pub(crate) fn proxy_dropped(handle: Handle) {
        let mut nodes = state().nodes.lock().unwrap();
        if let Some(record) = nodes.get(&handle) {
            if record.object.strong_count() == 0 && !record.async_scheduled {
                nodes.remove(&handle);
            }
        }
    }
}

/// Static utility functions to manage the state of the current thread with
/// respect to the transport.
pub struct ThreadState;

impl ThreadState {
    /// Serve queued work on the calling thread.
    ///
    /// With `is_main` set this never returns: the thread becomes a permanent
    /// member of the pool. Otherwise the call serves until no work is queued
    /// and none is in flight, then returns. The latter form is a barrier for
    /// previously submitted one-way transactions and death notifications.
    pub fn join_thread_pool(is_main: bool) {
        serve(state(), !is_main);
    }

    /// The process id of the caller of the transaction being served.
    pub fn get_calling_pid() -> libc::pid_t {
        // All transactions are delivered in-process.
        unsafe { libc::getpid() }
    }

    /// The user id of the caller of the transaction being served.
    pub fn get_calling_uid() -> libc::uid_t {
        unsafe { libc::getuid() }
    }
}

fn push_work(state: &'static State, work: Work) {
    let need_worker = {
        let mut queue = state.work.lock().unwrap();
        queue.queue.push_back(work);
        queue.waiting == 0
    };
    state.work_available.notify_all();
    if need_worker {
        spawn_worker(state);
    }
}

fn spawn_worker(state: &'static State) {
    let spawned = state.spawned_threads.load(Ordering::Relaxed);
    let max = state.max_threads.load(Ordering::Relaxed);
    if spawned >= max {
        return;
    }
    if state
        .spawned_threads
        .compare_exchange(spawned, spawned + 1, Ordering::Relaxed, Ordering::Relaxed)
        .is_err()
    {
        // Another thread raced us; one worker either way.
        return;
    }
    let name = format!("binder-{}", spawned + 1);
    let result = thread::Builder::new().name(name).spawn(move || serve(state, false));
    if let Err(err) = result {
        state.spawned_threads.fetch_sub(1, Ordering::Relaxed);
        log::error!("Failed to spawn binder worker thread: {}", err);
    }
}

/// Pop and execute work items. With `until_drained`, returns once the queue
/// is empty and nothing is executing; otherwise serves forever.
fn serve(state: &'static State, until_drained: bool) {
    loop {
        let work = {
            let mut queue = state.work.lock().unwrap();
            loop {
                if let Some(work) = queue.queue.pop_front() {
                    queue.in_flight += 1;
                    break Some(work);
                }
                if until_drained && queue.in_flight == 0 {
                    break None;
                }
                queue.waiting += 1;
                queue = state.work_available.wait(queue).unwrap();
                queue.waiting -= 1;
            }
        };
        let Some(work) = work else { return };

        let node_work = match &work {
            Work::NodeWork(handle) => Some(*handle),
            Work::Obituary(_) => None,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| execute(state, work)));
        if outcome.is_err() {
            log::error!("binder worker recovered from a panic in a transaction handler");
            if let Some(handle) = node_work {
                // The aborted drain left the node flagged as scheduled; queue
                // a fresh drain so its remaining work is not stranded.
                push_work(state, Work::NodeWork(handle));
            }
        }

        {
            let mut queue = state.work.lock().unwrap();
            queue.in_flight -= 1;
        }
        state.work_available.notify_all();
    }
}

fn execute(state: &'static State, work: Work) {
    match work {
        Work::NodeWork(handle) => loop {
            let next = {
                let mut nodes = state.nodes.lock().unwrap();
                let Some(record) = nodes.get_mut(&handle) else { break };
                let transaction = record.async_todo.pop_front();
                if transaction.is_none() {
                    record.async_scheduled = false;
                    // The drain was the last thing keeping this node around.
                    if record.object.strong_count() == 0 && record.proxy.strong_count() == 0 {
                        nodes.remove(&handle);
                    }
                }
                transaction
            };
            let Some(AsyncTransaction { object, code, data, flags }) = next else { break };
            if let Err(status) = deliver_transaction(&*object, code, &data, flags) {
                log::error!(
                    "One-way transaction {} on {} failed: {}",
                    code,
                    object.descriptor(),
                    status
                );
            }
        },
        Work::Obituary(recipients) => {
            for recipient in recipients {
                if let Some(recipient) = recipient.upgrade() {
                    recipient.notify();
                }
            }
        }
    }
}
