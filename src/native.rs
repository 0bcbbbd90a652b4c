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

//! Rust API for interacting with a remotable binder service.

use crate::binder::{
    IBinder, Interface, ObjectCleanup, ObjectId, Remotable, TransactionCode, TransactionFlags,
};
use crate::error::{Result, StatusCode};
use crate::parcel::{Parcel, Serialize};
use crate::proxy::{DeathRecipient, SpIBinder};
use crate::state::{Handle, ProcessState};

use downcast_rs::{impl_downcast, DowncastSync};
use std::any::Any;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, OnceLock};

/// Rust wrapper around a remotable object, hosting it for transactions.
///
/// This struct is the strong owner of the hosted object. The object stays
/// alive as long as any strong handle to it exists: the `Binder` itself, a
/// local [`SpIBinder`], a parcel carrying it, or a service registry entry.
/// Proxies do not own the object; when the last strong handle drops, the
/// object is torn down and its death notifications fire.
pub struct Binder<T: Remotable> {
    inner: Arc<BinderInner<T>>,
}

/// The hosted object together with its node identity and side table.
pub(crate) struct BinderInner<T: Remotable> {
    object: T,
    handle: Handle,
    // Allocated on first attach; plain binders never pay for the table.
    extras: OnceLock<Extras>,
}

/// Internal interface of a hosted object, as seen by the transport.
///
/// Object-safe so that the node registry and parcels can refer to any hosted
/// object uniformly, and downcast-able so that a local binder recovered from
/// a parcel or the service registry can be returned to its concrete type.
pub(crate) trait BinderObject: DowncastSync {
    fn descriptor(&self) -> &'static str;

    fn handle(&self) -> Handle;

    /// The side table, if one was ever allocated.
    fn extras(&self) -> Option<&Extras>;

    /// The side table, allocating it first if necessary.
    fn extras_or_init(&self) -> &Extras;

    fn on_transact(
        &self,
        code: TransactionCode,
        data: &Parcel,
        reply: &mut Parcel,
    ) -> Result<()>;
}
impl_downcast!(sync BinderObject);

impl<T: Remotable> BinderObject for BinderInner<T> {
    fn descriptor(&self) -> &'static str {
        T::get_descriptor()
    }

    fn handle(&self) -> Handle {
        self.handle
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.get()
    }

    fn extras_or_init(&self) -> &Extras {
        self.extras.get_or_init(Extras::default)
    }

    fn on_transact(
        &self,
        code: TransactionCode,
        data: &Parcel,
        reply: &mut Parcel,
    ) -> Result<()> {
        self.object.on_transact(code, data, reply)
    }
}

impl<T: Remotable> Drop for BinderInner<T> {
    fn drop(&mut self) {
        // Remaining attachments are released through their cleanup functions
        // before the node is declared dead.
        if let Some(extras) = self.extras.take() {
            extras.teardown();
        }
        ProcessState::node_destroyed(self.handle);
    }
}

/// Deliver one transaction to a hosted object, producing the reply parcel.
///
/// Control transactions are answered here without consulting the object.
/// The data parcel is rewound before delivery and the reply is rewound
/// before it is returned, so neither side depends on the other's cursor
/// discipline.
pub(crate) fn deliver_transaction(
    object: &dyn BinderObject,
    code: TransactionCode,
    data: &Parcel,
    _flags: TransactionFlags,
) -> Result<Parcel> {
    data.set_data_position(0)?;
    let mut reply = Parcel::new();
    match code {
        SpIBinder::PING_TRANSACTION => {}
        SpIBinder::INTERFACE_TRANSACTION => reply.write(object.descriptor())?,
        _ => object.on_transact(code, data, &mut reply)?,
    }
    reply.set_data_position(0)?;
    Ok(reply)
}

/// Keyed table of objects attached to a binder, each with an optional
/// cleanup function.
#[derive(Default)]
pub(crate) struct Extras {
    objects: Mutex<HashMap<ObjectId, Attachment>>,
}

struct Attachment {
    object: Arc<dyn Any + Send + Sync>,
    cleanup: Option<ObjectCleanup>,
}

impl Extras {
    /// Insert an attachment, displacing any existing entry under the same
    /// id. The displaced entry's cleanup runs before this returns, outside
    /// the table lock, and the displaced object is handed back.
    pub(crate) fn attach(
        &self,
        id: ObjectId,
        object: Arc<dyn Any + Send + Sync>,
        cleanup: Option<ObjectCleanup>,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        let displaced = self.objects.lock().unwrap().insert(id, Attachment { object, cleanup });
        displaced.map(|entry| {
            if let Some(cleanup) = entry.cleanup {
                cleanup(id, entry.object.clone());
            }
            entry.object
        })
    }

    pub(crate) fn find(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.objects.lock().unwrap().get(&id).map(|entry| entry.object.clone())
    }

    /// Remove an attachment, running its cleanup outside the table lock.
    pub(crate) fn detach(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        let removed = self.objects.lock().unwrap().remove(&id);
        removed.map(|entry| {
            if let Some(cleanup) = entry.cleanup {
                cleanup(id, entry.object.clone());
            }
            entry.object
        })
    }

    /// Run every remaining cleanup. Order between entries is unspecified.
    pub(crate) fn teardown(self) {
        let objects = self.objects.into_inner().unwrap();
        for (id, entry) in objects {
            if let Some(cleanup) = entry.cleanup {
                cleanup(id, entry.object);
            }
        }
    }
}

impl<T: Remotable> Binder<T> {
    /// Create a new binder hosting the given object.
    pub fn new(object: T) -> Binder<T> {
        Binder {
            inner: Arc::new(BinderInner {
                object,
                handle: ProcessState::next_handle(),
                extras: OnceLock::new(),
            }),
        }
    }

    /// The number of strong references keeping the hosted object alive:
    /// local strong handles, plus one for the node's proxy record while any
    /// proxy is alive.
    pub fn strong_count(&self) -> usize {
        let pinned = ProcessState::proxy_alive(self.inner.handle);
        Arc::strong_count(&self.inner) + usize::from(pinned)
    }
}

impl<T: Remotable> Interface for Binder<T> {
    fn as_binder(&self) -> SpIBinder {
        SpIBinder::from_local(self.inner.clone())
    }
}

impl<T: Remotable> IBinder for Binder<T> {
    fn transact<F: FnOnce(&mut Parcel) -> Result<()>>(
        &self,
        code: TransactionCode,
        flags: TransactionFlags,
        input_callback: F,
    ) -> Result<Parcel> {
        let mut data = Parcel::new();
        input_callback(&mut data)?;
        // Local binders execute on the calling thread, one-way included.
        deliver_transaction(self.inner.as_ref(), code, &data, flags)
    }

    fn get_interface_descriptor(&self) -> Result<String> {
        Ok(T::get_descriptor().to_string())
    }

    fn is_binder_alive(&self) -> bool {
        true
    }

    fn ping_binder(&mut self) -> Result<()> {
        self.transact(Self::PING_TRANSACTION, 0, |_| Ok(())).map(|_| ())
    }

    fn link_to_death(&mut self, _recipient: &mut DeathRecipient) -> Result<()> {
        Err(StatusCode::INVALID_OPERATION)
    }

    fn unlink_to_death(&mut self, _recipient: &mut DeathRecipient) -> Result<()> {
        Err(StatusCode::INVALID_OPERATION)
    }

    fn attach_object(
        &self,
        id: ObjectId,
        object: Arc<dyn Any + Send + Sync>,
        cleanup: Option<ObjectCleanup>,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.extras_or_init().attach(id, object, cleanup)
    }

    fn find_object(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.extras().and_then(|extras| extras.find(id))
    }

    fn detach_object(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.extras().and_then(|extras| extras.detach(id))
    }

    fn check_subclass(&self, id: ObjectId) -> bool {
        id.as_str() == T::get_descriptor()
    }
}

impl<T: Remotable> Deref for Binder<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.object
    }
}

/// Recover the original `Binder` from a strong handle, if it locally hosts
/// an object of type `T`.
impl<T: Remotable> TryFrom<SpIBinder> for Binder<T> {
    type Error = StatusCode;

    fn try_from(ibinder: SpIBinder) -> Result<Self> {
        let object = ibinder.local_object().ok_or(StatusCode::BAD_TYPE)?;
        match object.downcast_arc::<BinderInner<T>>() {
            Ok(inner) => Ok(Binder { inner }),
            Err(_) => Err(StatusCode::BAD_TYPE),
        }
    }
}

impl<T: Remotable> Serialize for Binder<T> {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_binder(Some(&self.as_binder()))
    }
}
