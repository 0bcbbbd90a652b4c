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

//! Rust API for interacting with a remote binder service.

use crate::binder::{
    FromIBinder, IBinder, ObjectCleanup, ObjectId, TransactionCode, TransactionFlags,
};
use crate::error::{Result, StatusCode};
use crate::native::{deliver_transaction, BinderObject, Extras};
use crate::parcel::Parcel;
use crate::state::{Handle, ProcessState};

use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, Weak};

/// A strong handle to a binder object.
///
/// A handle is either local, owning the hosted object together with the
/// other strong handles, or remote, referring to the object through the
/// node's proxy record without owning it. Handles to the same node compare
/// equal regardless of which side they are on.
pub struct SpIBinder {
    kind: Kind,
}

enum Kind {
    Local(Arc<dyn BinderObject>),
    Proxy(Arc<ProxyHandle>),
}

impl SpIBinder {
    pub(crate) fn from_local(object: Arc<dyn BinderObject>) -> SpIBinder {
        SpIBinder { kind: Kind::Local(object) }
    }

    pub(crate) fn from_proxy(proxy: Arc<ProxyHandle>) -> SpIBinder {
        SpIBinder { kind: Kind::Proxy(proxy) }
    }

    pub(crate) fn handle(&self) -> Handle {
        match &self.kind {
            Kind::Local(object) => object.handle(),
            Kind::Proxy(proxy) => proxy.handle(),
        }
    }

    /// The hosted object, if this is a local handle.
    pub(crate) fn local_object(&self) -> Option<Arc<dyn BinderObject>> {
        match &self.kind {
            Kind::Local(object) => Some(object.clone()),
            Kind::Proxy(_) => None,
        }
    }

    /// Attempt to convert this handle into a particular interface type.
    pub fn into_interface<I: FromIBinder + ?Sized>(self) -> Result<Box<I>> {
        FromIBinder::try_from(self)
    }
}

impl Clone for SpIBinder {
    fn clone(&self) -> SpIBinder {
        let kind = match &self.kind {
            Kind::Local(object) => Kind::Local(object.clone()),
            Kind::Proxy(proxy) => Kind::Proxy(proxy.clone()),
        };
        SpIBinder { kind }
    }
}

impl PartialEq for SpIBinder {
    fn eq(&self, other: &Self) -> bool {
        self.handle() == other.handle()
    }
}

impl Eq for SpIBinder {}

impl fmt::Debug for SpIBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match &self.kind {
            Kind::Local(_) => "local",
            Kind::Proxy(_) => "proxy",
        };
        f.debug_struct("SpIBinder").field("handle", &self.handle()).field("side", &side).finish()
    }
}

impl IBinder for SpIBinder {
    fn transact<F: FnOnce(&mut Parcel) -> Result<()>>(
        &self,
        code: TransactionCode,
        flags: TransactionFlags,
        input_callback: F,
    ) -> Result<Parcel> {
        let mut data = Parcel::new();
        input_callback(&mut data)?;
        match &self.kind {
            Kind::Local(object) => deliver_transaction(object.as_ref(), code, &data, flags),
            Kind::Proxy(proxy) => ProcessState::transact(proxy.handle(), code, flags, data),
        }
    }

    fn get_interface_descriptor(&self) -> Result<String> {
        match &self.kind {
            Kind::Local(object) => Ok(object.descriptor().to_string()),
            Kind::Proxy(_) => {
                let reply = self.transact(Self::INTERFACE_TRANSACTION, 0, |_| Ok(()))?;
                reply.read()
            }
        }
    }

    fn is_binder_alive(&self) -> bool {
        match &self.kind {
            Kind::Local(_) => true,
            Kind::Proxy(proxy) => ProcessState::node_object(proxy.handle()).is_some(),
        }
    }

    fn ping_binder(&mut self) -> Result<()> {
        self.transact(Self::PING_TRANSACTION, 0, |_| Ok(())).map(|_| ())
    }

    fn link_to_death(&mut self, recipient: &mut DeathRecipient) -> Result<()> {
        let proxy = match &self.kind {
            Kind::Local(_) => return Err(StatusCode::INVALID_OPERATION),
            Kind::Proxy(proxy) => proxy,
        };
        match ProcessState::node_object(proxy.handle()) {
            Some(guard) => {
                // The strong guard keeps the node alive across registration,
                // so the link cannot land after the obituaries were taken.
                proxy.add_recipient(Arc::downgrade(&recipient.inner));
                drop(guard);
                Ok(())
            }
            None => {
                recipient.inner.notify();
                Err(StatusCode::DEAD_OBJECT)
            }
        }
    }

    fn unlink_to_death(&mut self, recipient: &mut DeathRecipient) -> Result<()> {
        let proxy = match &self.kind {
            Kind::Local(_) => return Err(StatusCode::INVALID_OPERATION),
            Kind::Proxy(proxy) => proxy,
        };
        if ProcessState::node_object(proxy.handle()).is_none() {
            return Err(StatusCode::DEAD_OBJECT);
        }
        if proxy.remove_recipient(&recipient.inner) {
            Ok(())
        } else {
            Err(StatusCode::NAME_NOT_FOUND)
        }
    }

    fn attach_object(
        &self,
        id: ObjectId,
        object: Arc<dyn Any + Send + Sync>,
        cleanup: Option<ObjectCleanup>,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        match &self.kind {
            Kind::Local(local) => local.extras_or_init().attach(id, object, cleanup),
            Kind::Proxy(proxy) => proxy.extras.attach(id, object, cleanup),
        }
    }

    fn find_object(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        match &self.kind {
            Kind::Local(local) => local.extras().and_then(|extras| extras.find(id)),
            Kind::Proxy(proxy) => proxy.extras.find(id),
        }
    }

    fn detach_object(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        match &self.kind {
            Kind::Local(local) => local.extras().and_then(|extras| extras.detach(id)),
            Kind::Proxy(proxy) => proxy.extras.detach(id),
        }
    }

    fn check_subclass(&self, id: ObjectId) -> bool {
        match &self.kind {
            Kind::Local(object) => id.as_str() == object.descriptor(),
            Kind::Proxy(_) => false,
        }
    }
}

/// The canonical proxy record of a node.
///
/// All remote handles to a node share one record; its lifetime is the
/// node's remote strong reference. Creating it increments the node's
/// observed strong count by one, dropping it releases that single
/// reference, regardless of how many remote handles were cloned.
pub(crate) struct ProxyHandle {
    handle: Handle,
    // Attachments on a remote binder belong to the proxy side.
    extras: Extras,
    recipients: Mutex<Vec<Weak<RecipientInner>>>,
}

impl ProxyHandle {
    pub(crate) fn new(handle: Handle) -> Arc<ProxyHandle> {
        Arc::new(ProxyHandle {
            handle,
            extras: Extras::default(),
            recipients: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    fn add_recipient(&self, recipient: Weak<RecipientInner>) {
        self.recipients.lock().unwrap().push(recipient);
    }

    fn remove_recipient(&self, recipient: &Arc<RecipientInner>) -> bool {
        let target = Arc::downgrade(recipient);
        let mut recipients = self.recipients.lock().unwrap();
        match recipients.iter().position(|linked| linked.ptr_eq(&target)) {
            Some(index) => {
                recipients.remove(index);
                true
            }
            None => false,
        }
    }

    /// Take every registered death link. Links fire at most once.
    pub(crate) fn take_recipients(&self) -> Vec<Weak<RecipientInner>> {
        mem::take(&mut *self.recipients.lock().unwrap())
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        mem::take(&mut self.extras).teardown();
        ProcessState::proxy_dropped(self.handle);
    }
}

/// A weak handle to a binder object.
pub struct WpIBinder {
    kind: WeakKind,
    handle: Handle,
}

enum WeakKind {
    Local(Weak<dyn BinderObject>),
    Proxy(Weak<ProxyHandle>),
}

impl WpIBinder {
    /// Create a new weak handle from an existing strong one.
    pub fn new(binder: &mut SpIBinder) -> WpIBinder {
        let handle = binder.handle();
        let kind = match &binder.kind {
            Kind::Local(object) => WeakKind::Local(Arc::downgrade(object)),
            Kind::Proxy(proxy) => WeakKind::Proxy(Arc::downgrade(proxy)),
        };
        WpIBinder { kind, handle }
    }

    /// Attempt to promote this weak handle back to a strong one. Fails once
    /// the strong handles it was created from are all gone.
    pub fn promote(&self) -> Option<SpIBinder> {
        match &self.kind {
            WeakKind::Local(object) => object.upgrade().map(SpIBinder::from_local),
            WeakKind::Proxy(proxy) => proxy.upgrade().map(SpIBinder::from_proxy),
        }
    }
}

impl Clone for WpIBinder {
    fn clone(&self) -> WpIBinder {
        let kind = match &self.kind {
            WeakKind::Local(object) => WeakKind::Local(object.clone()),
            WeakKind::Proxy(proxy) => WeakKind::Proxy(proxy.clone()),
        };
        WpIBinder { kind, handle: self.handle }
    }
}

impl PartialEq for WpIBinder {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for WpIBinder {}

impl fmt::Debug for WpIBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WpIBinder").field("handle", &self.handle).finish()
    }
}

/// Callback to allow a service to respond to the death of a binder object
/// it holds a handle to.
///
/// The registered links hold this recipient weakly; dropping the recipient
/// revokes its links.
pub struct DeathRecipient {
    inner: Arc<RecipientInner>,
}

pub(crate) struct RecipientInner {
    callback: Mutex<Box<dyn FnMut() + Send>>,
}

impl DeathRecipient {
    /// Create a new death recipient that will call the given callback when
    /// its associated object dies.
    pub fn new<F>(callback: F) -> DeathRecipient
    where
        F: FnMut() + Send + 'static,
    {
        DeathRecipient {
            inner: Arc::new(RecipientInner { callback: Mutex::new(Box::new(callback)) }),
        }
    }
}

impl RecipientInner {
    pub(crate) fn notify(&self) {
        (self.callback.lock().unwrap())()
    }
}
