cfg_if::cfg_if! {
    if #[cfg(debug_assertions)] {
        /// Verify a local structural invariant. On violation, dump the
        /// subtree rooted at the given node and abort.
        ///
        /// Compiled out in release builds. The condition must be free of
        /// side effects.
        macro_rules! rb_check {
            ($pool:expr, $node:expr, $cond:expr, $($msg:tt)+) => {
                if !$cond {
                    $crate::check::fatal($pool, $node, format_args!($($msg)+));
                }
            };
        }
    } else {
        macro_rules! rb_check {
            ($pool:expr, $node:expr, $cond:expr, $($msg:tt)+) => {};
        }
    }
}
