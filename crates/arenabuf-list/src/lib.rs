#![cfg_attr(not(test), no_std)]

//! Intrusive doubly linked lists whose links are keys into a store instead of
//! pointers. The store owns the nodes; a [`List`] only remembers its ends.

use core::marker::PhantomData;

use getset::CopyGetters;

/// A store that embeds one [`Link`] per node reachable through `K`.
///
/// A store may implement `Linked` for several key types when its nodes take
/// part in more than one kind of list.
pub trait Linked<K>
where
  K: Copy + Eq,
{
  fn link(&self, key: K) -> &Link<K>;
  fn link_mut(&mut self, key: K) -> &mut Link<K>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
pub struct Link<K>
where
  K: Copy,
{
  #[getset(get_copy = "pub")]
  next: Option<K>,
  #[getset(get_copy = "pub")]
  prev: Option<K>,
  #[getset(get_copy = "pub")]
  linked: bool,
}

impl<K> Default for Link<K>
where
  K: Copy,
{
  fn default() -> Self {
    Self {
      next: None,
      prev: None,
      linked: false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
pub struct List<K>
where
  K: Copy,
{
  #[getset(get_copy = "pub")]
  head: Option<K>,
  #[getset(get_copy = "pub")]
  tail: Option<K>,
  #[getset(get_copy = "pub")]
  len: usize,
}

impl<K> Default for List<K>
where
  K: Copy + Eq,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K> List<K>
where
  K: Copy + Eq,
{
  pub const fn new() -> Self {
    Self {
      head: None,
      tail: None,
      len: 0,
    }
  }

  #[inline]
  pub const fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  pub fn push_front<S>(&mut self, store: &mut S, key: K)
  where
    S: Linked<K>,
  {
    assert!(!store.link(key).linked, "node is already linked");

    let old_head = self.head;
    {
      let link = store.link_mut(key);
      link.prev = None;
      link.next = old_head;
      link.linked = true;
    }

    match old_head {
      Some(head) => store.link_mut(head).prev = Some(key),
      None => self.tail = Some(key),
    }

    self.head = Some(key);
    self.len += 1;
  }

  pub fn push_back<S>(&mut self, store: &mut S, key: K)
  where
    S: Linked<K>,
  {
    assert!(!store.link(key).linked, "node is already linked");

    let old_tail = self.tail;
    {
      let link = store.link_mut(key);
      link.next = None;
      link.prev = old_tail;
      link.linked = true;
    }

    match old_tail {
      Some(tail) => store.link_mut(tail).next = Some(key),
      None => self.head = Some(key),
    }

    self.tail = Some(key);
    self.len += 1;
  }

  /// Unlinks `key`, which must currently be a member of this list.
  pub fn remove<S>(&mut self, store: &mut S, key: K)
  where
    S: Linked<K>,
  {
    let (prev, next) = {
      let link = store.link_mut(key);
      assert!(link.linked, "node is not linked");
      let pair = (link.prev, link.next);
      *link = Link::default();
      pair
    };

    match prev {
      Some(prev) => store.link_mut(prev).next = next,
      None => {
        debug_assert!(self.head == Some(key), "node belongs to another list");
        self.head = next;
      }
    }

    match next {
      Some(next) => store.link_mut(next).prev = prev,
      None => self.tail = prev,
    }

    self.len -= 1;
  }

  pub fn pop_front<S>(&mut self, store: &mut S) -> Option<K>
  where
    S: Linked<K>,
  {
    let head = self.head?;
    self.remove(store, head);
    Some(head)
  }

  pub fn iter<'store, S>(&self, store: &'store S) -> ListIter<'store, K, S>
  where
    S: Linked<K>,
  {
    ListIter::new(store, self.head)
  }
}

pub struct ListIter<'store, K, S>
where
  K: Copy + Eq,
  S: Linked<K>,
{
  store: &'store S,
  next: Option<K>,
  marker: PhantomData<K>,
}

impl<'store, K, S> ListIter<'store, K, S>
where
  K: Copy + Eq,
  S: Linked<K>,
{
  pub fn new(store: &'store S, start: Option<K>) -> Self {
    Self {
      store,
      next: start,
      marker: PhantomData,
    }
  }
}

impl<K, S> Iterator for ListIter<'_, K, S>
where
  K: Copy + Eq,
  S: Linked<K>,
{
  type Item = K;

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    self.next = self.store.link(current).next;
    Some(current)
  }
}
