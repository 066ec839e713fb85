//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use komiut_core::async_effect;
///
/// async_effect! {
///     let reply = selection_api.confirm(&vehicle_id).await;
///     Some(QueueAction::SelectionConfirmed { vehicle_id })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use komiut_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(30),
///     action: QueueAction::SelectionTimedOut { vehicle_id, requested_at }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! always builds Effect::Future");
        };
        assert_eq!(
            tokio_test::block_on(fut),
            Some(TestAction::AsyncResult { value: 42 })
        );
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::TimeoutExpired
        };

        match effect {
            Effect::Delay { duration, action } => {
                assert_eq!(duration, Duration::from_secs(30));
                assert_eq!(*action, TestAction::TimeoutExpired);
            },
            other => unreachable!("unexpected effect {other:?}"),
        }
    }
}
