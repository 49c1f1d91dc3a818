//! Stock reducer strategies.

use std::marker::PhantomData;

use super::{Emitter, Reducer};

/// Emits every item; a plain ordered merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeSort;

impl<K, T: 'static> Reducer<K, T, T, ()> for MergeSort {
    fn on_first_item(&self, out: &mut Emitter<'_, T>, _key: &K, item: T) {
        out.emit(item);
    }

    fn on_next_item(&self, out: &mut Emitter<'_, T>, _key: &K, item: T, _acc: ()) {
        out.emit(item);
    }

    fn on_complete(&self, _out: &mut Emitter<'_, T>, _key: &K, _acc: ()) {}
}

/// Emits the first item of every key and drops the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicate;

impl<K, T: 'static> Reducer<K, T, T, ()> for Deduplicate {
    fn on_first_item(&self, out: &mut Emitter<'_, T>, _key: &K, item: T) {
        out.emit(item);
    }

    fn on_next_item(&self, _out: &mut Emitter<'_, T>, _key: &K, _item: T, _acc: ()) {}

    fn on_complete(&self, _out: &mut Emitter<'_, T>, _key: &K, _acc: ()) {}
}

/// Folds each group into an accumulator and emits one result per key.
pub struct Accumulate<F, G, H, A> {
    first: F,
    next: G,
    complete: H,
    _acc: PhantomData<fn() -> A>,
}

pub fn accumulate<K, I, O, A, F, G, H>(first: F, next: G, complete: H) -> Accumulate<F, G, H, A>
where
    F: Fn(&K, I) -> A,
    G: Fn(&K, I, A) -> A,
    H: Fn(&K, A) -> O,
{
    Accumulate {
        first,
        next,
        complete,
        _acc: PhantomData,
    }
}

impl<K, I, O, A, F, G, H> Reducer<K, I, O, A> for Accumulate<F, G, H, A>
where
    O: 'static,
    F: Fn(&K, I) -> A,
    G: Fn(&K, I, A) -> A,
    H: Fn(&K, A) -> O,
{
    fn on_first_item(&self, _out: &mut Emitter<'_, O>, key: &K, item: I) -> A {
        (self.first)(key, item)
    }

    fn on_next_item(&self, _out: &mut Emitter<'_, O>, key: &K, item: I, acc: A) -> A {
        (self.next)(key, item, acc)
    }

    fn on_complete(&self, out: &mut Emitter<'_, O>, key: &K, acc: A) {
        out.emit((self.complete)(key, acc));
    }
}
