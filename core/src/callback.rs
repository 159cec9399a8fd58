// Callback adapters: typed marshalling from positional Values
use crate::value::{describe, Arg, ArgType, Value};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

type Invoke = Box<dyn FnMut(Vec<Value>) -> Result<(), FailureKind> + Send>;

/// Why a single delivery did not reach the callback body (or did not finish).
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// Wrong number of arguments for the callback.
    Arity { expected: usize, found: usize },
    /// Argument at `index` has a different structural type.
    Type {
        index: usize,
        expected: ArgType,
        found: ArgType,
    },
    /// The callback panicked; holds the panic message when one was available.
    Panic(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Arity { expected, found } => {
                write!(f, "expected {} argument(s), got {}", expected, found)
            }
            FailureKind::Type {
                index,
                expected,
                found,
            } => write!(
                f,
                "argument {} expected {}, got {}",
                index, expected, found
            ),
            FailureKind::Panic(msg) => write!(f, "callback panicked: {}", msg),
        }
    }
}

/// Diagnostic produced by a subscriber worker when a delivery fails.
#[derive(Error, Debug, Clone)]
#[error("delivery to subscription {subscription_id} on topic {topic:?} failed: {kind}")]
pub struct DeliveryFailure {
    pub subscription_id: u64,
    pub topic: String,
    pub kind: FailureKind,
    pub occurred_at: DateTime<Utc>,
}

/// A callback bound to a subscription.
///
/// Built from closures through [`IntoCallback`], which records the parameter
/// types as the callback's signature, or from [`Callback::variadic`] for
/// callbacks that take the raw argument list and declare no signature.
pub struct Callback {
    signature: Option<Vec<ArgType>>,
    invoke: Invoke,
}

impl Callback {
    /// Wraps a callback that receives every delivered argument list as is.
    ///
    /// A variadic callback has no signature and therefore cannot be bound on
    /// a bus with a schema registry.
    pub fn variadic<F>(mut f: F) -> Self
    where
        F: FnMut(Vec<Value>) + Send + 'static,
    {
        Self {
            signature: None,
            invoke: Box::new(move |args| {
                f(args);
                Ok(())
            }),
        }
    }

    /// Declared parameter types, or `None` for a variadic callback.
    pub fn signature(&self) -> Option<&[ArgType]> {
        self.signature.as_deref()
    }

    /// Invokes the callback, converting marshalling errors and panics into a
    /// [`FailureKind`].
    pub(crate) fn call(&mut self, args: Vec<Value>) -> Result<(), FailureKind> {
        match catch_unwind(AssertUnwindSafe(|| (self.invoke)(args))) {
            Ok(res) => res,
            Err(payload) => Err(FailureKind::Panic(panic_message(payload))),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signature {
            Some(sig) => write!(f, "Callback{}", describe(sig)),
            None => f.write_str("Callback(..)"),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Conversion of a closure into a [`Callback`].
///
/// `Params` is a marker (the tuple of parameter types) that lets one closure
/// type pick exactly one implementation. Implemented for `FnMut` closures of
/// zero to six parameters whose types implement [`Arg`], and for `Callback`
/// itself.
pub trait IntoCallback<Params>: Send + 'static {
    fn into_callback(self) -> Callback;
}

impl IntoCallback<Callback> for Callback {
    fn into_callback(self) -> Callback {
        self
    }
}

macro_rules! typed_callback {
    ($($ty:ident $var:ident),*) => {
        impl<Func, $($ty),*> IntoCallback<($($ty,)*)> for Func
        where
            Func: FnMut($($ty),*) + Send + 'static,
            $($ty: Arg,)*
        {
            #[allow(unused_mut, unused_variables)]
            fn into_callback(self) -> Callback {
                let signature: Vec<ArgType> = vec![$(<$ty as Arg>::TYPE),*];
                let expected = signature.len();
                let mut func = self;
                Callback {
                    signature: Some(signature),
                    invoke: Box::new(move |args: Vec<Value>| {
                        let found = args.len();
                        if found != expected {
                            return Err(FailureKind::Arity { expected, found });
                        }
                        let mut iter = args.into_iter().enumerate();
                        $(
                            let Some((index, value)) = iter.next() else {
                                return Err(FailureKind::Arity { expected, found });
                            };
                            let actual = value.arg_type();
                            let $var = <$ty as Arg>::from_value(value).ok_or(FailureKind::Type {
                                index,
                                expected: <$ty as Arg>::TYPE,
                                found: actual,
                            })?;
                        )*
                        func($($var),*);
                        Ok(())
                    }),
                }
            }
        }
    };
}

typed_callback!();
typed_callback!(A a);
typed_callback!(A a, B b);
typed_callback!(A a, B b, C c);
typed_callback!(A a, B b, C c, D d);
typed_callback!(A a, B b, C c, D d, E e);
typed_callback!(A a, B b, C c, D d, E e, F f);
