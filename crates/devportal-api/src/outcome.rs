use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Decoded result of a successful (2xx) portal response.
///
/// Some endpoints answer a request they have carried out with a body that
/// is not valid JSON. Tolerant callers receive that as
/// [`Outcome::NonConforming`] rather than an error, so the call still
/// counts as a success while the odd body stays observable.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The body decoded into the expected type.
    Parsed(T),
    /// The portal returned no body (or an empty one).
    NoContent,
    /// The request succeeded but the body did not decode.
    NonConforming { message: String, body: Bytes },
}

impl<T: DeserializeOwned> Outcome<T> {
    /// Decode a success body.
    pub fn decode(body: Option<Bytes>) -> Self {
        let Some(body) = body else {
            return Self::NoContent;
        };
        match serde_json::from_slice(&body) {
            Ok(value) => Self::Parsed(value),
            Err(e) => Self::NonConforming {
                message: e.to_string(),
                body,
            },
        }
    }
}

impl<T> Outcome<T> {
    /// Strict view: anything but a parsed value is an error.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Parsed(value) => Ok(value),
            Self::NoContent => Err(Error::Deserialization {
                message: "expected a JSON body, got no content".into(),
                body: String::new(),
            }),
            Self::NonConforming { message, body } => {
                let body = String::from_utf8_lossy(&body).into_owned();
                let preview: String = body.chars().take(200).collect();
                Err(Error::Deserialization {
                    message: format!("{message} (body preview: {preview:?})"),
                    body,
                })
            }
        }
    }

    /// The parsed value, if there is one.
    pub fn parsed(self) -> Option<T> {
        match self {
            Self::Parsed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_non_conforming(&self) -> bool {
        matches!(self, Self::NonConforming { .. })
    }
}
