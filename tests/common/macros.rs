#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok(_), got Err({:?})", err),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!(concat!("Expected Ok(_): ", $($arg)+, ": {:?}"), err),
        }
    };
}

/// Asserts that `$expr` failed with exactly `$kind`.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr, $kind:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err({:?}), got Ok({:?})", $kind, val),
            Err(err) => assert_eq!(err, $kind),
        }
    };
}
