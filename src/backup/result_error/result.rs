use crate::backup::result_error::error::Error;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithFnName, WithMsg};
use std::fmt::Debug;

pub type Result<T> = std::result::Result<T, Error>;

impl<S: Into<String>, O: Debug + Send + 'static, R> WithDebugObjectAndFnName<S, O> for Result<R> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        self.map_err(|e| e.with_debug_object_and_fn_name(obj, fn_name))
    }
}

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

impl<R, S: Into<String>> WithFnName<S> for Result<R> {
    fn with_fn_name(self, fn_name: S) -> Self {
        self.map_err(|e| e.with_fn_name(fn_name))
    }
}

pub fn convert_error_vec(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_vec_empty_is_ok() {
        assert!(convert_error_vec(vec![]).is_ok());
    }

    #[test]
    fn test_convert_error_vec_keeps_every_error() {
        let res = convert_error_vec(vec![
            Error::Config("first".into()),
            Error::Config("second".into()),
        ]);
        match res {
            Err(Error::LotsOfError(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("Expected LotsOfError, got {other:?}"),
        }
    }

    #[test]
    fn test_result_with_msg_only_touches_errors() {
        let ok: Result<u8> = Ok(1);
        assert_eq!(ok.with_msg("unused").unwrap(), 1);

        let err: Result<u8> = Err(Error::NoStrategyAvailable);
        let err = err.with_msg("Resolving strategy").unwrap_err();
        assert!(matches!(err.root(), Error::NoStrategyAvailable));
    }
}
