use dicom::core::Tag;
use dicom::object::DefaultDicomObject;

/// Small helper trait to pull typed values out of a parsed DICOM object.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    /// First value of a numeric (possibly multi-valued) element.
    fn element_f64(&self, tag: Tag) -> Option<f64>;
    fn element_f64_pair(&self, tag: Tag) -> Option<(f64, f64)>;
    fn element_u32(&self, tag: Tag) -> Option<u32>;
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim_end_matches(|c: char| c == '\0' || c == ' ').to_string())
            .filter(|s| !s.is_empty())
    }

    fn element_f64(&self, tag: Tag) -> Option<f64> {
        self.element(tag).ok().and_then(|e| e.to_float64().ok())
    }

    fn element_f64_pair(&self, tag: Tag) -> Option<(f64, f64)> {
        let values = self.element(tag).ok()?.to_multi_float64().ok()?;
        match values.as_slice() {
            [a, b, ..] => Some((*a, *b)),
            _ => None,
        }
    }

    fn element_u32(&self, tag: Tag) -> Option<u32> {
        self.element(tag).ok().and_then(|e| e.to_int::<u32>().ok())
    }
}
