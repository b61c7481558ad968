use konspace::{FixInt, Space, nym};

fn main() {
    let space = Space::new();

    let mut list = space.null();
    for i in (1..=5).rev() {
        list = space.cons(FixInt::new(i), &list).expect("allocation");
    }

    print!("list:");
    let mut walk = list.clone();
    while !walk.is_null() {
        print!(" {}", walk.seq_car().fixint_value());
        let rest = walk.seq_cdr();
        walk = rest;
    }
    println!();

    let vec = space.make_vec(nym::VEC, 4, FixInt::new(0)).expect("allocation");
    vec.vec_store(2, FixInt::new(42));
    print!("{}[{}]:", vec.header_nym(), vec.vec_value_capacity());
    for i in 0..vec.vec_value_capacity() {
        print!(" {}", vec.vec_fetch(i).fixint_value());
    }
    println!();

    let blob = space
        .make_blob(nym::BLB, 2, FixInt::new(0), 8)
        .expect("allocation");
    blob.blob_set(0, 0xc0);
    blob.blob_set(1, 0xde);
    println!(
        "{}: {} slots + {} bytes, first bytes {:02x}{:02x}",
        blob.header_nym(),
        blob.blob_val_capacity(),
        blob.blob_raw_capacity(),
        blob.blob_get(0),
        blob.blob_get(1),
    );

    println!("live roots: {}", space.root_count());
}
