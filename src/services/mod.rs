pub mod delivery_service;
pub mod dispatcher_service;
pub mod ledger_service;
pub mod publisher_service;
pub mod queue_service;
pub mod registry_service;
pub mod webhook_service;
