//
// frames.rs
// Dicom-Viewer-rs
//
// Multi-frame bookkeeping: frame-qualified identifiers, frame-count precedence, and bounds-checked navigation.
//
// Thales Matheus Mendonça Santos - November 2025

use crate::error::DecodeError;

const FRAME_PARAM: &str = "frame";

/// Appends `frame=<index>` to a base identifier, respecting an existing query string.
/// A `#fragment` stays at the end.
pub fn frame_image_id(base_id: &str, index: u32) -> String {
    let (path, fragment) = split_fragment(base_id);
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}{}", path, separator, FRAME_PARAM, index, fragment)
}

/// Splits a possibly frame-qualified identifier into its base identifier and frame index.
pub fn parse_frame_id(image_id: &str) -> Result<(String, Option<u32>), DecodeError> {
    let (path, fragment) = split_fragment(image_id);
    let Some((base, query)) = path.split_once('?') else {
        return Ok((image_id.to_string(), None));
    };

    let mut frame = None;
    let mut kept = Vec::new();
    for param in query.split('&') {
        match param.split_once('=') {
            Some((FRAME_PARAM, value)) => {
                let index = value
                    .parse::<u32>()
                    .map_err(|_| DecodeError::MalformedIdentifier(image_id.to_string()))?;
                frame = Some(index);
            }
            _ if param == FRAME_PARAM => {
                return Err(DecodeError::MalformedIdentifier(image_id.to_string()));
            }
            _ => kept.push(param),
        }
    }

    let base = if kept.is_empty() {
        format!("{}{}", base, fragment)
    } else {
        format!("{}?{}{}", base, kept.join("&"), fragment)
    };
    Ok((base, frame))
}

/// `(before, "#fragment")`, or `(id, "")` when there is no fragment.
fn split_fragment(id: &str) -> (&str, &str) {
    match id.find('#') {
        Some(at) => id.split_at(at),
        None => (id, ""),
    }
}

/// Number of frames, preferring the NumberOfFrames tag over the decoder's count.
pub fn resolve_frame_count(tag_value: Option<u32>, decoder_value: Option<u32>) -> u32 {
    tag_value
        .filter(|&n| n >= 1)
        .or(decoder_value.filter(|&n| n >= 1))
        .unwrap_or(1)
}

/// A validated frame switch waiting for its decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    pub index: u32,
    pub image_id: String,
}

/// Tracks the active frame of the loaded image resource.
#[derive(Debug, Clone, Default)]
pub struct FrameNavigator {
    base_id: Option<String>,
    frame_count: u32,
    current_frame: u32,
}

impl FrameNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the navigator to a freshly loaded resource.
    pub fn attach(&mut self, base_id: &str, frame_count: u32, current_frame: u32) {
        self.base_id = Some(base_id.to_string());
        self.frame_count = frame_count.max(1);
        self.current_frame = current_frame.min(self.frame_count - 1);
    }

    pub fn detach(&mut self) {
        *self = Self::default();
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// Validates a target frame. Out-of-range indices and the current frame yield `None`.
    pub fn go_to(&self, index: i64) -> Option<FrameRequest> {
        let base = self.base_id.as_deref()?;
        if index < 0 || index >= i64::from(self.frame_count) {
            return None;
        }
        let index = index as u32;
        if index == self.current_frame {
            return None;
        }
        Some(FrameRequest {
            index,
            image_id: frame_image_id(base, index),
        })
    }

    pub fn next(&self) -> Option<FrameRequest> {
        self.go_to(i64::from(self.current_frame) + 1)
    }

    pub fn previous(&self) -> Option<FrameRequest> {
        self.go_to(i64::from(self.current_frame) - 1)
    }

    pub fn first(&self) -> Option<FrameRequest> {
        self.go_to(0)
    }

    pub fn last(&self) -> Option<FrameRequest> {
        self.go_to(i64::from(self.frame_count) - 1)
    }

    /// Moves the frame counter once a request has been resolved.
    pub fn commit(&mut self, request: &FrameRequest) {
        if request.index < self.frame_count {
            self.current_frame = request.index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigator(frames: u32) -> FrameNavigator {
        let mut nav = FrameNavigator::new();
        nav.attach("dicomfile:cine-abc", frames, 0);
        nav
    }

    #[test]
    fn frame_id_uses_question_mark_or_ampersand() {
        assert_eq!(frame_image_id("dicomfile:a", 3), "dicomfile:a?frame=3");
        assert_eq!(
            frame_image_id("wadouri:http://h/x.dcm?token=1", 2),
            "wadouri:http://h/x.dcm?token=1&frame=2"
        );
    }

    #[test]
    fn frame_parameter_goes_before_the_fragment() {
        let id = frame_image_id("wadouri:http://h/x.dcm?token=1#series", 4);
        assert_eq!(id, "wadouri:http://h/x.dcm?token=1&frame=4#series");
        assert_eq!(frame_image_id("wadouri:http://h/x.dcm#s", 1), "wadouri:http://h/x.dcm?frame=1#s");

        let (base, frame) = parse_frame_id(&id).unwrap();
        assert_eq!(base, "wadouri:http://h/x.dcm?token=1#series");
        assert_eq!(frame, Some(4));
        let (base, frame) = parse_frame_id("wadouri:http://h/x.dcm?frame=1#s").unwrap();
        assert_eq!(base, "wadouri:http://h/x.dcm#s");
        assert_eq!(frame, Some(1));
    }

    #[test]
    fn parse_recovers_base_and_frame() {
        let (base, frame) = parse_frame_id("wadouri:http://h/x.dcm?token=1&frame=2").unwrap();
        assert_eq!(base, "wadouri:http://h/x.dcm?token=1");
        assert_eq!(frame, Some(2));

        let (base, frame) = parse_frame_id("dicomfile:a").unwrap();
        assert_eq!(base, "dicomfile:a");
        assert_eq!(frame, None);
    }

    #[test]
    fn parse_rejects_malformed_frame() {
        assert!(matches!(
            parse_frame_id("dicomfile:a?frame=two"),
            Err(DecodeError::MalformedIdentifier(_))
        ));
        assert!(parse_frame_id("dicomfile:a?frame").is_err());
    }

    #[test]
    fn tag_count_wins_over_decoder_count() {
        assert_eq!(resolve_frame_count(Some(10), Some(1)), 10);
        assert_eq!(resolve_frame_count(None, Some(4)), 4);
        assert_eq!(resolve_frame_count(Some(0), Some(4)), 4);
        assert_eq!(resolve_frame_count(None, None), 1);
    }

    #[test]
    fn out_of_range_requests_are_ignored() {
        let nav = navigator(10);
        assert!(nav.go_to(-1).is_none());
        assert!(nav.go_to(10).is_none());
        assert!(nav.previous().is_none());
        assert_eq!(nav.current_frame(), 0);
    }

    #[test]
    fn boundaries_and_commit() {
        let mut nav = navigator(10);
        let last = nav.last().expect("last frame");
        assert_eq!(last.index, 9);
        assert_eq!(last.image_id, "dicomfile:cine-abc?frame=9");
        nav.commit(&last);
        assert!(nav.next().is_none());
        assert_eq!(nav.previous().map(|r| r.index), Some(8));
        assert_eq!(nav.first().map(|r| r.index), Some(0));
    }

    #[test]
    fn detached_navigator_is_inert() {
        let nav = FrameNavigator::new();
        assert!(nav.go_to(0).is_none());
        assert!(nav.next().is_none());
    }
}
