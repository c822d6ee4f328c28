/// Call the specified closure. Abort if it panics.
///
/// Some operations (freeing a tree, a destructive merge) hand elements to
/// user callbacks while the tree they came from is half torn down. Unwinding
/// out of such a callback would leave handles to released slots behind, so
/// a panic there is escalated to an abort instead.
#[inline]
pub fn abort_on_unwind<R>(f: impl FnOnce() -> R) -> R {
    struct Aborter;
    impl Drop for Aborter {
        #[inline]
        fn drop(&mut self) {
            panic!("a tree was left half-modified by a panicking callback");
        }
    }

    let aborter = Aborter;
    let ret = f();
    core::mem::forget(aborter);

    ret
}

/// Call the closure through [`abort_on_unwind`] if `guarded` is set.
#[inline]
pub fn abort_on_unwind_if<R>(guarded: bool, f: impl FnOnce() -> R) -> R {
    if guarded {
        abort_on_unwind(f)
    } else {
        f()
    }
}
