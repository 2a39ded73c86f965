//! Log sink shared by every context: the browser console on wasm, `tracing`
//! everywhere else.

pub(crate) fn log(message: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        gloo::console::log!(message);
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        tracing::info!("{message}");
    }
}

pub(crate) fn debug(message: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        gloo::console::debug!(message);
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        tracing::debug!("{message}");
    }
}

pub(crate) fn warn(message: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        gloo::console::warn!(message);
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        tracing::warn!("{message}");
    }
}
