use crate::node::{Kind, NodeRef};

/// Ascending iterator over the key/value pairs of a tree, optionally bounded to
/// `[start, end)`.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    /// Subtrees still to visit, the next one on top.
    stack: Vec<&'a NodeRef>,
    end: Option<Vec<u8>>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(root: Option<&'a NodeRef>, start: Option<&[u8]>, end: Option<&[u8]>) -> Self {
        let mut stack = Vec::new();

        if let Some(root) = root {
            match start {
                None => stack.push(root),
                Some(start) => seek(root, start, &mut stack),
            }
        }

        Self {
            stack,
            end: end.map(<[u8]>::to_vec),
        }
    }
}

/// Fills `stack` with the subtrees holding keys `>= start`, in visiting order.
fn seek<'a>(mut node: &'a NodeRef, start: &[u8], stack: &mut Vec<&'a NodeRef>) {
    loop {
        match node.kind() {
            Kind::Leaf { key, .. } => {
                if key.as_slice() >= start {
                    stack.push(node);
                }
                return;
            }
            Kind::Inner {
                left,
                right,
                split_key,
            } => {
                if start < split_key.as_slice() {
                    stack.push(right);
                    node = left;
                } else {
                    node = right;
                }
            }
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node.kind() {
                Kind::Leaf { key, value } => {
                    if matches!(&self.end, Some(end) if key >= end) {
                        self.stack.clear();
                        return None;
                    }
                    return Some((key.as_slice(), value.as_slice()));
                }
                Kind::Inner { left, right, .. } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
            }
        }

        None
    }
}
