use crate::duration::{DurationError, PromDuration};
use std::fmt;

/// A lookback window between two boundaries relative to "now".
///
/// `from` is the nearer boundary and `to` the farther one, so `1h`..`10h`
/// covers the data written between ten hours and one hour ago. The raw
/// boundary strings are kept as written in the configuration because they
/// double as metric label values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Window {
    from: String,
    to: String,
    from_offset: PromDuration,
    to_offset: PromDuration,
}

impl Window {
    pub fn new(from: &str, to: &str) -> Result<Self, DurationError> {
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            from_offset: PromDuration::parse(from)?,
            to_offset: PromDuration::parse(to)?,
        })
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn from_offset(&self) -> PromDuration {
        self.from_offset
    }

    /// Span of the window, `None` when `to` is nearer than `from`.
    pub fn length(&self) -> Option<PromDuration> {
        self.to_offset.checked_sub(self.from_offset)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LadderError {
    #[error("window ladder needs at least two boundaries, got {0}")]
    TooShort(usize),

    #[error("window ladder boundary '{boundary}': {source}")]
    Boundary {
        boundary: String,
        #[source]
        source: DurationError,
    },

    #[error("window ladder must grow by at least one minute per step: '{from}' -> '{to}'")]
    NotIncreasing { from: String, to: String },
}

/// Ordered boundaries defining adjacent windows: N boundaries give N-1 windows.
///
/// # Examples
///
/// ```
/// use alertcheck_common::window::WindowLadder;
///
/// let ladder = WindowLadder::parse(&["1h", "10h", "1d"]).unwrap();
/// let spans: Vec<String> = ladder.windows().iter().map(|w| w.to_string()).collect();
/// assert_eq!(spans, vec!["1h-10h", "10h-1d"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLadder {
    windows: Vec<Window>,
}

impl WindowLadder {
    pub fn parse<S: AsRef<str>>(boundaries: &[S]) -> Result<Self, LadderError> {
        if boundaries.len() < 2 {
            return Err(LadderError::TooShort(boundaries.len()));
        }

        for boundary in boundaries {
            let boundary = boundary.as_ref();
            PromDuration::parse(boundary).map_err(|source| LadderError::Boundary {
                boundary: boundary.to_string(),
                source,
            })?;
        }

        let mut windows = Vec::with_capacity(boundaries.len() - 1);
        for pair in boundaries.windows(2) {
            let (from, to) = (pair[0].as_ref(), pair[1].as_ref());
            let window = Window::new(from, to).map_err(|source| LadderError::Boundary {
                boundary: format!("{from}-{to}"),
                source,
            })?;
            let long_enough = window
                .length()
                .is_some_and(|len| !len.truncate_to_minute().is_zero());
            if !long_enough {
                return Err(LadderError::NotIncreasing {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            windows.push(window);
        }

        Ok(Self { windows })
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
