/// Parsed-result tree produced by a single-unit scan.
///
/// The orchestration core never interprets header fields; it only checks
/// the tree for keyframe-bearing nodes and hands the rest to the host for
/// display.
use compact_str::CompactString;
use serde::Serialize;

/// One parsed header / frame node. Children are sub-headers or frames in
/// parse order.
#[derive(Clone, Debug, Serialize)]
pub struct ResultNode {
    pub name: CompactString,
    /// Byte offset of the parsed data within the scanned fragment.
    pub offset: u64,
    pub length: u64,
    /// `true` if this node is a frame decodable without reference to
    /// preceding frames.
    pub is_keyframe: bool,
    pub children: Vec<ResultNode>,
}

/// A keyframe extracted from a result tree, referenced by the thumbnail
/// overview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Keyframe {
    pub name: CompactString,
    pub offset: u64,
    pub length: u64,
}

impl ResultNode {
    pub fn new(name: impl Into<CompactString>, offset: u64, length: u64) -> Self {
        Self {
            name: name.into(),
            offset,
            length,
            is_keyframe: false,
            children: Vec::new(),
        }
    }

    pub fn keyframe(name: impl Into<CompactString>, offset: u64, length: u64) -> Self {
        Self {
            is_keyframe: true,
            ..Self::new(name, offset, length)
        }
    }

    pub fn with_children(mut self, children: Vec<ResultNode>) -> Self {
        self.children = children;
        self
    }

    /// `true` if this node or any descendant is a keyframe.
    pub fn has_keyframes(&self) -> bool {
        self.is_keyframe || self.children.iter().any(ResultNode::has_keyframes)
    }

    /// Collect up to `max` keyframes in pre-order (parse order).
    pub fn collect_keyframes(&self, max: usize) -> Vec<Keyframe> {
        let mut out = Vec::new();
        self.collect_into(max, &mut out);
        out
    }

    fn collect_into(&self, max: usize, out: &mut Vec<Keyframe>) {
        if out.len() >= max {
            return;
        }
        if self.is_keyframe {
            out.push(Keyframe {
                name: self.name.clone(),
                offset: self.offset,
                length: self.length,
            });
        }
        for child in &self.children {
            if out.len() >= max {
                return;
            }
            child.collect_into(max, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(offset: u64, key: bool) -> ResultNode {
        if key {
            ResultNode::keyframe("frame", offset, 10)
        } else {
            ResultNode::new("frame", offset, 10)
        }
    }

    #[test]
    fn has_keyframes_looks_into_descendants() {
        let tree = ResultNode::new("header", 0, 100)
            .with_children(vec![frame(0, false), frame(10, false)]);
        assert!(!tree.has_keyframes());

        let tree = ResultNode::new("header", 0, 100).with_children(vec![
            frame(0, false),
            ResultNode::new("gop", 10, 50).with_children(vec![frame(10, true)]),
        ]);
        assert!(tree.has_keyframes());
    }

    #[test]
    fn collect_keyframes_caps_at_max_in_parse_order() {
        let children: Vec<ResultNode> = (0..8).map(|i| frame(i * 10, true)).collect();
        let tree = ResultNode::new("header", 0, 100).with_children(children);

        let keyframes = tree.collect_keyframes(5);
        assert_eq!(keyframes.len(), 5);
        let offsets: Vec<u64> = keyframes.iter().map(|k| k.offset).collect();
        assert_eq!(offsets, vec![0, 10, 20, 30, 40]);
    }
}
