pub(crate) mod health_check_controller;
pub(crate) mod relay_status_controller;
pub(crate) mod webhook_controller;
