use proptest::prelude::*;
use quill_core::{ImmutableStack, Rope};

#[derive(Debug, Clone)]
enum Op {
    Insert(usize, Vec<u16>),
    Remove(usize, usize),
    Set(usize, u16),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), prop::collection::vec(any::<u16>(), 1..400)).prop_map(|(i, v)| Op::Insert(i, v)),
        (any::<usize>(), 1usize..500).prop_map(|(i, n)| Op::Remove(i, n)),
        (any::<usize>(), any::<u16>()).prop_map(|(i, v)| Op::Set(i, v)),
    ]
}

proptest! {
    #[test]
    fn rope_tracks_reference_vec(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut rope = Rope::new();
        let mut reference: Vec<u16> = Vec::new();
        for op in ops {
            match op {
                Op::Insert(i, items) => {
                    let index = i % (reference.len() + 1);
                    rope.insert_slice(index, &items).unwrap();
                    reference.splice(index..index, items);
                }
                Op::Remove(i, n) if !reference.is_empty() => {
                    let index = i % reference.len();
                    let count = n.min(reference.len() - index);
                    rope.remove_range(index, count).unwrap();
                    reference.drain(index..index + count);
                }
                Op::Set(i, v) if !reference.is_empty() => {
                    let index = i % reference.len();
                    rope.set(index, v).unwrap();
                    reference[index] = v;
                }
                _ => {}
            }
            rope.assert_invariants();
            prop_assert_eq!(rope.to_vec(), reference.clone());
        }
    }

    #[test]
    fn get_range_matches_slice(len in 0usize..3_000, a in any::<usize>(), b in any::<usize>()) {
        let data: Vec<u32> = (0..len as u32).collect();
        let rope = Rope::from_slice(&data);
        let start = if len == 0 { 0 } else { a % (len + 1) };
        let count = if len == start { 0 } else { b % (len - start + 1) };
        let range = rope.get_range(start, count).unwrap();
        range.assert_invariants();
        prop_assert_eq!(range.to_vec(), data[start..start + count].to_vec());
    }

    #[test]
    fn stack_equality_is_structural(values in prop::collection::vec(0u8..4, 0..20)) {
        let a: ImmutableStack<u8> = values.iter().copied().collect();
        let b: ImmutableStack<u8> = values.iter().copied().collect();
        prop_assert_eq!(&a, &b);
        let pushed = a.push(9);
        prop_assert_ne!(&pushed, &b);
        prop_assert_eq!(pushed.pop().unwrap(), b);
    }
}
