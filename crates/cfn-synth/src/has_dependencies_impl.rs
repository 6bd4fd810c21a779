//! Implementations of HasDependencies for primitives.

use crate::{self as synth, HasDependencies};

macro_rules! go {
    ($type: ty) => {
        impl HasDependencies for $type {}
    };
}

go!(String);
go!(&'static str);
go!(u8);
go!(u16);
go!(u32);
go!(u64);
go!(i32);
go!(i64);
go!(bool);
go!(serde_json::Value);

impl<T: HasDependencies> HasDependencies for Vec<T> {
    fn dependencies(&self) -> synth::Dependencies {
        self.iter()
            .fold(synth::Dependencies::default(), |acc, item| {
                acc.merge(item.dependencies())
            })
    }
}

impl<K, V: HasDependencies> HasDependencies for std::collections::BTreeMap<K, V> {
    fn dependencies(&self) -> synth::Dependencies {
        self.values()
            .fold(synth::Dependencies::default(), |acc, item| {
                acc.merge(item.dependencies())
            })
    }
}

impl<V: HasDependencies> HasDependencies for Option<V> {
    fn dependencies(&self) -> synth::Dependencies {
        self.iter()
            .fold(synth::Dependencies::default(), |acc, item| {
                acc.merge(item.dependencies())
            })
    }
}

impl<T: HasDependencies> HasDependencies for Box<T> {
    fn dependencies(&self) -> synth::Dependencies {
        self.as_ref().dependencies()
    }
}
