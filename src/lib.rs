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

//! Transactional IPC object model: typed parcels, remotable objects, proxy
//! handles, death notification, and versioned service interfaces.
//!
//! # Example
//!
//! ```
//! use hwbinder::{
//!     declare_binder_interface, Binder, IBinder, Interface, Parcel, SpIBinder, TransactionCode,
//! };
//!
//! pub trait ITest: Interface {
//!     fn test(&self) -> hwbinder::Result<String>;
//! }
//!
//! declare_binder_interface! {
//!     ITest["android.os.ITest"] {
//!         native: BnTest(on_transact),
//!         proxy: BpTest,
//!     }
//! }
//!
//! fn on_transact(
//!     service: &dyn ITest,
//!     _code: TransactionCode,
//!     _data: &Parcel,
//!     reply: &mut Parcel,
//! ) -> hwbinder::Result<()> {
//!     reply.write(&service.test()?)
//! }
//!
//! impl ITest for BpTest {
//!     fn test(&self) -> hwbinder::Result<String> {
//!         let reply = self.binder.transact(SpIBinder::FIRST_CALL_TRANSACTION, 0, |_| Ok(()))?;
//!         reply.read()
//!     }
//! }
//!
//! impl ITest for Binder<BnTest> {
//!     fn test(&self) -> hwbinder::Result<String> {
//!         self.0.test()
//!     }
//! }
//!
//! // The local implementation of the interface.
//! struct TestService;
//!
//! impl Interface for TestService {}
//!
//! impl ITest for TestService {
//!     fn test(&self) -> hwbinder::Result<String> {
//!         Ok("testing service".to_string())
//!     }
//! }
//!
//! // Publish it, then reach it back through the service manager.
//! let service = BnTest::new_binder(TestService);
//! hwbinder::add_service("testing", service.as_binder()).unwrap();
//!
//! let client: Box<dyn ITest> = hwbinder::get_interface("testing").unwrap();
//! assert_eq!(client.test().unwrap(), "testing service");
//! ```

#[macro_use]
mod binder;

mod error;
mod native;
mod proxy;
mod state;

pub mod interfaces;
pub mod parcel;
pub mod service_manager;

pub use crate::binder::{
    BinderService, FromIBinder, IBinder, Interface, ObjectCleanup, ObjectId, Proxy, Remotable,
    TransactionCode, TransactionFlags,
};
pub use crate::error::{ExceptionCode, Result, Status, StatusCode};
pub use crate::native::Binder;
pub use crate::parcel::Parcel;
pub use crate::proxy::{DeathRecipient, SpIBinder, WpIBinder};
pub use crate::service_manager::{
    add_service, check_service, get_interface, get_service, wait_for_service, DumpFlags,
    ServiceManager,
};
pub use crate::state::{ProcessState, ThreadState};

/// Re-exports of core structures, prefixed with `Binder`.
///
/// This module renames binder exports so they can be glob-imported without
/// conflicting with standard structures. Import the prelude with:
/// ```rust
/// use hwbinder::prelude::*;
/// ```
pub mod prelude {
    pub use super::Binder;
    pub use super::IBinder;
    pub use super::Interface as BinderInterface;
    pub use super::Remotable as BinderRemotable;
    pub use super::Result as BinderResult;
    pub use super::Status as BinderStatus;
    pub use super::StatusCode as BinderStatusCode;
}
