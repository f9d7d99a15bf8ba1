//! Path resolver: tokenizer and walker over a single-rooted, slash-separated
//! namespace (§4.5).

use alloc::vec::Vec;

use crate::errors::Error;
use crate::inode::{self, Inode};
use crate::pool::{Pool, Slot};

/// One path token: a directory component to walk through, or the final
/// (leaf) component of the path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    Branch(&'a [u8]),
    Leaf(&'a [u8]),
}

/// Splits `path` into tokens. Requires a leading slash; rejects `.` and
/// `..` components.
pub fn tokenize(path: &[u8]) -> Result<Vec<Token<'_>>, Error> {
    if path.first() != Some(&b'/') {
        return Err(Error::InvalidArgument);
    }
    let components: Vec<&[u8]> = path[1..]
        .split(|&b| b == b'/')
        .filter(|c| !c.is_empty())
        .collect();
    if components.is_empty() {
        return Err(Error::InvalidArgument);
    }
    for c in &components {
        if *c == b"." || *c == b".." {
            return Err(Error::InvalidArgument);
        }
    }
    let last = components.len() - 1;
    Ok(components
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            if i == last {
                Token::Leaf(c)
            } else {
                Token::Branch(c)
            }
        })
        .collect())
}

/// Outcome of walking a path to its end.
pub enum Resolution {
    /// Full match: resolved inode and its parent.
    Found { inode: Slot, parent: Slot },
    /// The final token did not match, but its parent directory exists.
    ParentOnly { parent: Slot },
    /// An intermediate token did not match; nothing to hand back.
    NotFound,
}

/// Walks `path` from `root`, matching each token against the current
/// directory's children by binary name comparison.
pub fn find(pool: &Pool<Inode>, root: Slot, path: &[u8]) -> Result<Resolution, Error> {
    let tokens = tokenize(path)?;
    let last = tokens.len() - 1;
    let mut dir = root;
    for (i, token) in tokens.iter().enumerate() {
        let name = match token {
            Token::Branch(n) | Token::Leaf(n) => *n,
        };
        if !pool.get(dir).ok_or(Error::Corrupt)?.is_directory() {
            return Ok(Resolution::NotFound);
        }
        match find_child(pool, dir, name) {
            Some(child) if i == last => {
                return Ok(Resolution::Found { inode: child, parent: dir });
            }
            Some(child) => dir = child,
            None if i == last => {
                return Ok(Resolution::ParentOnly { parent: dir });
            }
            None => return Ok(Resolution::NotFound),
        }
    }
    unreachable!("tokenize never returns an empty token stream")
}

fn find_child(pool: &Pool<Inode>, dir: Slot, name: &[u8]) -> Option<Slot> {
    let mut cur = pool.get(dir)?.children;
    while let Some(slot) = cur {
        let node = pool.get(slot)?;
        if node.filename.as_bytes() == name {
            return Some(slot);
        }
        cur = node.next_sibling;
    }
    None
}

/// Checks `dir` holds no children, per the unlink non-empty-directory rule.
pub fn is_empty_dir(pool: &Pool<Inode>, dir: Slot) -> bool {
    pool.get(dir).map(|n| n.children.is_none()).unwrap_or(true)
}

pub use inode::compare_names;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Id, InodeFlags};

    fn make_dir(pool: &mut Pool<Inode>, id: u32) -> Slot {
        let mut inode = Inode::root();
        inode.id = Id::new(id);
        inode.flags = InodeFlags::DIRECTORY;
        pool.alloc(inode).unwrap()
    }

    fn make_file(pool: &mut Pool<Inode>, id: u32, name: &str) -> Slot {
        let mut inode = Inode::root();
        inode.id = Id::new(id);
        inode.flags = InodeFlags::EMPTY;
        inode.filename = crate::inode::ShortName::from_bytes(name.as_bytes()).unwrap();
        pool.alloc(inode).unwrap()
    }

    #[test]
    fn tokenize_rejects_relative_paths() {
        assert!(tokenize(b"a/b").is_err());
        assert!(tokenize(b"/a/../b").is_err());
        assert!(tokenize(b"/a/./b").is_err());
    }

    #[test]
    fn find_reports_parent_only_on_missing_leaf() {
        let mut pool: Pool<Inode> = Pool::with_capacity(8);
        let root = make_dir(&mut pool, 0);
        match find(&pool, root, b"/missing").unwrap() {
            Resolution::ParentOnly { parent } => assert_eq!(parent, root),
            _ => panic!("expected ParentOnly"),
        }
    }

    #[test]
    fn find_resolves_existing_file() {
        let mut pool: Pool<Inode> = Pool::with_capacity(8);
        let root = make_dir(&mut pool, 0);
        let file = make_file(&mut pool, 1, "a");
        inode::add_child(&mut pool, root, file).unwrap();
        match find(&pool, root, b"/a").unwrap() {
            Resolution::Found { inode, parent } => {
                assert_eq!(inode, file);
                assert_eq!(parent, root);
            }
            _ => panic!("expected Found"),
        }
    }
}
