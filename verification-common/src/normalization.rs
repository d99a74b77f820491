use crate::code_artifact_types::LinkReferences;

/// Replaces every library placeholder window of a recompiled bytecode with
/// zero bytes. The resulting code is what gets content-addressed and stored,
/// so that two builds differing only in linked library addresses share a
/// compiled-contract row. Immutables in recompiled code are already zero and
/// are left untouched.
///
/// Windows reaching past the end of the code are ignored rather than
/// rejected, matching how compilers emit link references for truncated
/// bytecode listings.
pub fn normalize_library_placeholders(
    mut code: Vec<u8>,
    link_references: &LinkReferences,
) -> Vec<u8> {
    for file_references in link_references.values() {
        for offsets in file_references.values() {
            for offset in offsets {
                let start = offset.start as usize;
                let end = start + offset.length as usize;
                if end <= code.len() {
                    code[start..end].fill(0);
                }
            }
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_artifact_types::Offset;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn link_references(offsets: Vec<Offset>) -> LinkReferences {
        BTreeMap::from([(
            "contracts/Lib.sol".to_string(),
            BTreeMap::from([("Lib".to_string(), offsets)]),
        )])
    }

    #[test]
    fn placeholder_windows_are_zeroed() {
        let mut code = vec![0x60, 0x80];
        code.extend([0xaa; 20]);
        code.push(0xff);

        let normalized = normalize_library_placeholders(
            code,
            &link_references(vec![Offset {
                start: 2,
                length: 20,
            }]),
        );

        let mut expected = vec![0x60, 0x80];
        expected.extend([0x00; 20]);
        expected.push(0xff);
        assert_eq!(normalized, expected);
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut code = vec![0x60, 0x80];
        code.extend([0xaa; 20]);

        let references = link_references(vec![Offset {
            start: 2,
            length: 20,
        }]);
        let once = normalize_library_placeholders(code, &references);
        let twice = normalize_library_placeholders(once.clone(), &references);
        assert_eq!(once, twice);
    }

    #[test]
    fn out_of_range_windows_are_ignored() {
        let code = vec![0x60, 0x80];
        let normalized = normalize_library_placeholders(
            code.clone(),
            &link_references(vec![Offset {
                start: 1,
                length: 20,
            }]),
        );
        assert_eq!(normalized, code);
    }

    #[test]
    fn empty_link_references_leave_the_code_untouched() {
        let code = vec![0x60, 0x80, 0x60, 0x40];
        let normalized = normalize_library_placeholders(code.clone(), &LinkReferences::new());
        assert_eq!(normalized, code);
    }
}
