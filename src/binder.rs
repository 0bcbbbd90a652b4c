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

//! Trait definitions for binder objects.

use crate::error::Result;
use crate::native::Binder;
use crate::parcel::Parcel;
use crate::proxy::{DeathRecipient, SpIBinder};
use crate::service_manager::{DumpFlags, ServiceManager};
use crate::state::{ProcessState, ThreadState};

use std::any::Any;
use std::sync::Arc;

/// Binder action to perform.
///
/// This must be a number between [`IBinder::FIRST_CALL_TRANSACTION`] and
/// [`IBinder::LAST_CALL_TRANSACTION`], or one of the well-known control
/// transactions.
pub type TransactionCode = u32;

/// Additional operation flags.
///
/// `IBinder::FLAG_*` values.
pub type TransactionFlags = u32;

/// Key identifying an entry in a binder's object side table.
///
/// Ids are compared by their string contents, so two ids constructed from
/// equal strings name the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(&'static str);

impl ObjectId {
    pub const fn new(id: &'static str) -> ObjectId {
        ObjectId(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Cleanup function for a side table entry.
///
/// Runs exactly once, on whichever of replacement, detach, or binder teardown
/// claims the entry first. Any per-entry context the original attacher needs
/// is captured by the closure.
pub type ObjectCleanup = Box<dyn FnOnce(ObjectId, Arc<dyn Any + Send + Sync>) + Send>;

/// A binder object with a standard interface.
///
/// This trait is implemented by the generated proxy and native structs of a
/// declared interface, and is how interface objects are converted back into
/// generic binders for transport.
pub trait Interface: Send + Sync {
    /// Convert this binder object into a generic [`SpIBinder`] reference.
    fn as_binder(&self) -> SpIBinder {
        panic!("This object is not a binder")
    }
}

/// A local service that can be remoted via binder.
///
/// An object implementing this trait can be hosted by [`Binder`], which
/// dispatches incoming transactions to [`on_transact`](Self::on_transact)
/// after handling the well-known control codes itself.
pub trait Remotable: Send + Sync + 'static {
    /// The descriptor uniquely identifying the interface this object
    /// implements.
    fn get_descriptor() -> &'static str;

    /// Handle and reply to a request to invoke a transaction on this object.
    ///
    /// `reply` may be written to, but the caller will see it positioned at
    /// the start regardless of what this method does with its cursor.
    fn on_transact(
        &self,
        code: TransactionCode,
        data: &Parcel,
        reply: &mut Parcel,
    ) -> Result<()>;
}

// The interface of a plain object, satisfying interface bounds for hosts of
// remotable objects with no interface.
impl Interface for () {}

// A remotable object with no interface. Hosts for plain objects answer only
// the control transactions.
impl Remotable for () {
    fn get_descriptor() -> &'static str {
        ""
    }

    fn on_transact(
        &self,
        _code: TransactionCode,
        _data: &Parcel,
        _reply: &mut Parcel,
    ) -> Result<()> {
        Ok(())
    }
}

/// Interface of binder local or remote objects.
pub trait IBinder {
    /// First transaction code available for user commands.
    const FIRST_CALL_TRANSACTION: TransactionCode = 0x0000_0001;

    /// Last transaction code available for user commands.
    const LAST_CALL_TRANSACTION: TransactionCode = 0x00ff_ffff;

    /// Liveness probe, answered without involving the hosted object.
    const PING_TRANSACTION: TransactionCode = 0x5f50_4e47; // '_PNG'

    /// Interface descriptor query, answered without involving the hosted
    /// object.
    const INTERFACE_TRANSACTION: TransactionCode = 0x5f4e_5446; // '_NTF'

    /// Corresponds to TF_ONE_WAY: the transaction is asynchronous and returns
    /// an empty reply without waiting for the target to run.
    const FLAG_ONEWAY: TransactionFlags = 0x1;

    /// Perform a binder transaction.
    ///
    /// `input_callback` fills the data parcel before delivery. On success the
    /// reply parcel is positioned at the start of its data.
    fn transact<F: FnOnce(&mut Parcel) -> Result<()>>(
        &self,
        code: TransactionCode,
        flags: TransactionFlags,
        input_callback: F,
    ) -> Result<Parcel>;

    /// Retrieve the descriptor string of the interface this binder
    /// implements.
    fn get_interface_descriptor(&self) -> Result<String>;

    /// Returns whether the target object hosted by this binder is still
    /// alive.
    fn is_binder_alive(&self) -> bool;

    /// Send a ping transaction to this object.
    fn ping_binder(&mut self) -> Result<()>;

    /// Register the recipient for a notification when this binder's hosted
    /// object dies.
    ///
    /// You will only receive death notifications for remote binders, as local
    /// binders by definition can't die without you dying as well. Trying to
    /// use this function on a local binder will result in an
    /// `INVALID_OPERATION` code being returned and nothing happening.
    ///
    /// This link always holds a weak reference to its recipient. If the
    /// object has already died, the recipient is invoked immediately.
    fn link_to_death(&mut self, recipient: &mut DeathRecipient) -> Result<()>;

    /// Remove a previously registered death notification. The recipient will
    /// no longer be called if this object dies.
    fn unlink_to_death(&mut self, recipient: &mut DeathRecipient) -> Result<()>;

    /// Attach an object to this binder under the given id, returning the
    /// entry it displaced, if any.
    ///
    /// A displaced entry has its cleanup function run before this call
    /// returns. Attachments live alongside the binder they are attached to:
    /// on a remote binder they stay with the proxy and are not forwarded to
    /// the hosted object.
    fn attach_object(
        &self,
        id: ObjectId,
        object: Arc<dyn Any + Send + Sync>,
        cleanup: Option<ObjectCleanup>,
    ) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Look up the object attached under the given id.
    fn find_object(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Remove and return the object attached under the given id, running its
    /// cleanup function.
    fn detach_object(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Identity query: does this binder locally host an object of the
    /// interface named by `id`?
    ///
    /// Always false on remote binders; capability decisions about a remote
    /// object belong to its hosting side.
    fn check_subclass(&self, id: ObjectId) -> bool;
}

/// Interface for transforming a generic [`SpIBinder`] into a specific
/// interface object.
pub trait FromIBinder {
    /// Try to interpret a generic binder object as this interface.
    ///
    /// Returns a trait object for the interface, which may be a proxy or the
    /// local object itself when the binder is locally hosted.
    fn try_from(ibinder: SpIBinder) -> Result<Box<Self>>;
}

/// Interface implemented by the generated proxy struct of a declared
/// interface.
pub trait Proxy: Sized + Interface {
    /// The descriptor of the interface this proxy speaks.
    fn get_descriptor() -> &'static str;

    /// Create a proxy from the given binder, validating that the binder's
    /// remote side implements the expected interface.
    fn from_binder(binder: SpIBinder) -> Result<Self>;
}

/// A service that can be published to the service manager.
pub trait BinderService: Remotable + Default {
    /// Name under which this service is registered.
    const SERVICE_NAME: &'static str;

    /// Register a new instance of this service with the service manager.
    fn publish(allow_isolated: bool, dump_flags: DumpFlags) -> Result<()> {
        let mut sm = ServiceManager;
        sm.add_service(
            Self::SERVICE_NAME,
            Binder::new(Self::default()).as_binder(),
            allow_isolated,
            dump_flags,
        )
    }

    /// Register this service and then serve transactions on the calling
    /// thread. Only returns on error.
    fn publish_and_join_thread_pool(allow_isolated: bool, dump_flags: DumpFlags) -> Result<()> {
        Self::publish(allow_isolated, dump_flags)?;
        ProcessState::start_thread_pool();
        ThreadState::join_thread_pool(true);
        Ok(())
    }

    /// Register this service, ignoring failures.
    fn instantiate() {
        let _ = Self::publish(false, DumpFlags::PriorityDefault);
    }
}

/// Declare a binder interface.
///
/// This macro generates the native (`Bn`) and proxy (`Bp`) structs for an
/// interface trait, along with the conversion and serialization glue that
/// lets the trait object travel through parcels and come back out of
/// [`FromIBinder`].
///
/// The interface trait must have [`Interface`] as a supertrait. The caller
/// provides the dispatch function wiring transaction codes to trait methods,
/// plus the proxy-side and local-side implementations of the trait.
///
/// # Example
///
/// ```
/// use hwbinder::{
///     declare_binder_interface, Binder, IBinder, Interface, Parcel, SpIBinder, TransactionCode,
/// };
///
/// pub trait IEcho: Interface {
///     fn echo(&self, s: &str) -> hwbinder::Result<String>;
/// }
///
/// declare_binder_interface! {
///     IEcho["test.IEcho"] {
///         native: BnEcho(on_transact),
///         proxy: BpEcho,
///     }
/// }
///
/// fn on_transact(
///     service: &dyn IEcho,
///     _code: TransactionCode,
///     data: &Parcel,
///     reply: &mut Parcel,
/// ) -> hwbinder::Result<()> {
///     let s: String = data.read()?;
///     reply.write(&service.echo(&s)?)?;
///     Ok(())
/// }
///
/// impl IEcho for BpEcho {
///     fn echo(&self, s: &str) -> hwbinder::Result<String> {
///         let reply =
///             self.binder.transact(SpIBinder::FIRST_CALL_TRANSACTION, 0, |data| data.write(s))?;
///         reply.read()
///     }
/// }
///
/// impl IEcho for Binder<BnEcho> {
///     fn echo(&self, s: &str) -> hwbinder::Result<String> {
///         self.0.echo(s)
///     }
/// }
///
/// struct EchoService;
/// impl Interface for EchoService {}
/// impl IEcho for EchoService {
///     fn echo(&self, s: &str) -> hwbinder::Result<String> {
///         Ok(s.to_string())
///     }
/// }
///
/// let service = BnEcho::new_binder(EchoService);
/// assert_eq!(service.echo("hello").unwrap(), "hello");
/// ```
#[macro_export]
macro_rules! declare_binder_interface {
    {
        $interface:path[$descriptor:expr] {
            native: $native:ident($on_transact:path),
            proxy: $proxy:ident,
        }
    } => {
        $crate::declare_binder_interface! {
            $interface[$descriptor] {
                native: $native($on_transact),
                proxy: $proxy {},
            }
        }
    };

    {
        $interface:path[$descriptor:expr] {
            native: $native:ident($on_transact:path),
            proxy: $proxy:ident {
                $($fname:ident: $fty:ty = $finit:expr),*
            },
        }
    } => {
        $crate::declare_binder_interface! {
            $interface[$descriptor] {
                @doc[concat!("A binder [`Remotable`]($crate::Remotable) that holds an [`", stringify!($interface), "`] object.")]
                native: $native($on_transact),
                @doc[concat!("A binder [`Proxy`]($crate::Proxy) that holds an [`", stringify!($interface), "`] remote interface.")]
                proxy: $proxy {
                    $($fname: $fty = $finit),*
                },
            }
        }
    };

    {
        $interface:path[$descriptor:expr] {
            @doc[$native_doc:expr]
            native: $native:ident($on_transact:path),

            @doc[$proxy_doc:expr]
            proxy: $proxy:ident {
                $($fname:ident: $fty:ty = $finit:expr),*
            },
        }
    } => {
        #[doc = $proxy_doc]
        pub struct $proxy {
            pub binder: $crate::SpIBinder,
            $(pub $fname: $fty,)*
        }

        impl $crate::Interface for $proxy {
            fn as_binder(&self) -> $crate::SpIBinder {
                self.binder.clone()
            }
        }

        impl $crate::Proxy for $proxy
        where
            $proxy: $interface,
        {
            fn get_descriptor() -> &'static str {
                $descriptor
            }

            fn from_binder(binder: $crate::SpIBinder) -> $crate::Result<Self> {
                use $crate::IBinder;
                if binder.get_interface_descriptor()? != $descriptor {
                    return Err($crate::StatusCode::BAD_TYPE);
                }
                Ok(Self { binder, $($fname: $finit),* })
            }
        }

        #[doc = $native_doc]
        #[repr(transparent)]
        pub struct $native(pub Box<dyn $interface + Sync + Send + 'static>);

        impl $native {
            /// Create a new binder service hosting the given implementation.
            pub fn new_binder<T: $interface + Sync + Send + 'static>(
                inner: T,
            ) -> $crate::Binder<$native> {
                $crate::Binder::new($native(Box::new(inner)))
            }
        }

        impl $crate::Remotable for $native {
            fn get_descriptor() -> &'static str {
                $descriptor
            }

            fn on_transact(
                &self,
                code: $crate::TransactionCode,
                data: &$crate::Parcel,
                reply: &mut $crate::Parcel,
            ) -> $crate::Result<()> {
                match $on_transact(&*self.0, code, data, reply) {
                    // A missing mandatory value becomes a null-pointer
                    // exception in the reply rather than a transport error.
                    Err($crate::StatusCode::UNEXPECTED_NULL) => {
                        let status = $crate::Status::new_exception(
                            $crate::ExceptionCode::NULL_POINTER,
                            None,
                        );
                        reply.write(&status)
                    },
                    result => result
                }
            }
        }

        impl $crate::FromIBinder for dyn $interface {
            fn try_from(ibinder: $crate::SpIBinder) -> $crate::Result<Box<dyn $interface>> {
                let service: $crate::Result<$crate::Binder<$native>> =
                    std::convert::TryFrom::try_from(ibinder.clone());
                if let Ok(service) = service {
                    // The binder is hosted in this process; skip the proxy
                    // and call the object directly.
                    Ok(Box::new(service))
                } else {
                    Ok(Box::new(<$proxy as $crate::Proxy>::from_binder(ibinder)?))
                }
            }
        }

        impl $crate::parcel::Serialize for dyn $interface + '_ {
            fn serialize(
                &self,
                parcel: &mut $crate::parcel::Parcel,
            ) -> $crate::Result<()> {
                let binder = $crate::Interface::as_binder(self);
                parcel.write(&binder)
            }
        }

        impl $crate::parcel::SerializeOption for dyn $interface + '_ {
            fn serialize_option(
                this: Option<&Self>,
                parcel: &mut $crate::parcel::Parcel,
            ) -> $crate::Result<()> {
                parcel.write(&this.map($crate::Interface::as_binder))
            }
        }

        impl std::fmt::Debug for dyn $interface {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(stringify!($interface))
            }
        }

        // Convert a &dyn $interface to Box<dyn $interface>.
        impl std::borrow::ToOwned for dyn $interface {
            type Owned = Box<dyn $interface>;
            fn to_owned(&self) -> Self::Owned {
                self.as_binder().into_interface()
                    .expect(concat!("Error cloning interface ", stringify!($interface)))
            }
        }
    };
}

/// Declare an enumeration whose values cross the wire as their backing
/// integer type.
#[macro_export]
macro_rules! declare_binder_enum {
    {
        $enum:ident : $backing:ty {
            $( $name:ident = $value:expr, )*
        }
    } => {
        #[derive(Debug, Default, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
        pub struct $enum(pub $backing);
        impl $enum {
            $( pub const $name: Self = Self($value); )*
        }

        impl $crate::parcel::Serialize for $enum {
            fn serialize(&self, parcel: &mut $crate::parcel::Parcel) -> $crate::Result<()> {
                parcel.write(&self.0)
            }
        }

        impl $crate::parcel::SerializeArray for $enum {
            fn serialize_array(slice: &[Self], parcel: &mut $crate::parcel::Parcel) -> $crate::Result<()> {
                let v: Vec<$backing> = slice.iter().map(|x| x.0).collect();
                <$backing as $crate::parcel::SerializeArray>::serialize_array(&v[..], parcel)
            }
        }

        impl $crate::parcel::Deserialize for $enum {
            fn deserialize(parcel: &$crate::parcel::Parcel) -> $crate::Result<Self> {
                parcel.read().map(Self)
            }
        }

        impl $crate::parcel::DeserializeArray for $enum {
            fn deserialize_array(parcel: &$crate::parcel::Parcel) -> $crate::Result<Option<Vec<Self>>> {
                let v: Option<Vec<$backing>> =
                    <$backing as $crate::parcel::DeserializeArray>::deserialize_array(parcel)?;
                Ok(v.map(|v| v.into_iter().map(Self).collect()))
            }
        }
    };
}
