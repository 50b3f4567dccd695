#[cfg(feature = "tracing")]
macro_rules! ltrace {
    ($($tt:tt)*) => {
        tracing::trace!(target: "lazy_collection", $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! ltrace {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! ldebug {
    ($($tt:tt)*) => {
        tracing::debug!(target: "lazy_collection", $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! ldebug {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! lwarn {
    ($($tt:tt)*) => {
        tracing::warn!(target: "lazy_collection", $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! lwarn {
    ($($tt:tt)*) => {};
}
