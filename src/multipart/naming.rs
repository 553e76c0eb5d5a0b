use std::collections::HashSet;

/// File name for one extracted part.
///
/// Uses the part's explicit filename when present, then the last segment of
/// its `Content-Location` with `.dcm` appended, and finally
/// `instance_NNNN.dcm` from the 1-based stream position.
pub fn part_filename(
    explicit: Option<&str>,
    content_location: Option<&str>,
    index: usize,
) -> String {
    if let Some(name) = explicit.and_then(base_name) {
        return name.to_string();
    }

    if let Some(segment) = content_location.and_then(last_segment) {
        return format!("{segment}.dcm");
    }

    format!("instance_{index:04}.dcm")
}

/// Names already handed out during one extraction, compared case-insensitively
/// so archives unpack the same way on every filesystem.
#[derive(Debug, Default)]
pub(crate) struct UsedNames {
    seen: HashSet<String>,
}

impl UsedNames {
    /// Returns `name` if unused, otherwise `name` with `_NNNN` (the part
    /// index) inserted before its extension.
    pub(crate) fn claim(&mut self, name: String, index: usize) -> String {
        if self.seen.insert(name.to_lowercase()) {
            return name;
        }

        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => name.split_at(dot),
            _ => (name.as_str(), ""),
        };

        let mut attempt = 0usize;
        loop {
            let candidate = match attempt {
                0 => format!("{stem}_{index:04}{ext}"),
                n => format!("{stem}_{index:04}_{n}{ext}"),
            };
            if self.seen.insert(candidate.to_lowercase()) {
                return candidate;
            }
            attempt += 1;
        }
    }
}

/// Final path component, so a hostile filename cannot escape the output dir.
fn base_name(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        base => Some(base),
    }
}

fn last_segment(location: &str) -> Option<&str> {
    let path = location
        .split(['?', '#'])
        .next()?
        .trim()
        .trim_end_matches('/');
    base_name(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filename_wins() {
        assert_eq!(
            part_filename(Some("scan.dcm"), Some("/instances/1.2.3"), 5),
            "scan.dcm"
        );
    }

    #[test]
    fn explicit_filename_loses_its_directories() {
        assert_eq!(part_filename(Some("../../etc/passwd"), None, 1), "passwd");
        assert_eq!(part_filename(Some(r"C:\tmp\a.dcm"), None, 1), "a.dcm");
        assert_eq!(part_filename(Some(".."), None, 3), "instance_0003.dcm");
    }

    #[test]
    fn content_location_last_segment() {
        let loc = "http://pacs/dicom-web/studies/1.2/series/1.2.3/instances/1.2.3.4/";
        assert_eq!(part_filename(None, Some(loc), 1), "1.2.3.4.dcm");
        assert_eq!(
            part_filename(None, Some("/instances/9.8?accept=x#frag"), 1),
            "9.8.dcm"
        );
        assert_eq!(part_filename(None, Some("///"), 2), "instance_0002.dcm");
    }

    #[test]
    fn sequence_fallback_is_zero_padded() {
        assert_eq!(part_filename(None, None, 1), "instance_0001.dcm");
        assert_eq!(part_filename(None, None, 42), "instance_0042.dcm");
        assert_eq!(part_filename(None, None, 12345), "instance_12345.dcm");
    }

    #[test]
    fn clashing_names_get_the_part_index() {
        let mut used = UsedNames::default();
        assert_eq!(used.claim("1.dcm".into(), 1), "1.dcm");
        assert_eq!(used.claim("1.dcm".into(), 2), "1_0002.dcm");
        assert_eq!(used.claim("1.DCM".into(), 3), "1_0003.DCM");
        assert_eq!(used.claim("report".into(), 4), "report");
        assert_eq!(used.claim("report".into(), 5), "report_0005");
    }

    #[test]
    fn derived_name_that_is_taken_keeps_counting() {
        let mut used = UsedNames::default();
        assert_eq!(used.claim("1_0002.dcm".into(), 1), "1_0002.dcm");
        assert_eq!(used.claim("1.dcm".into(), 2), "1.dcm");
        assert_eq!(used.claim("1.dcm".into(), 2), "1_0002_1.dcm");
    }
}
