use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use ybind::Document;
use ybind_testnet::TestConnector;

fn doc_of(net: &TestConnector, id: usize) -> Document {
    net.replica(id).doc().clone()
}

fn random_edit(rng: &mut StdRng, doc: &Document, step: u32) {
    match rng.gen_range(0..4u8) {
        0 => {
            let list = doc.get_or_create_array("items").unwrap();
            list.push_back(f64::from(step)).unwrap();
        }
        1 => {
            let list = doc.get_or_create_array("items").unwrap();
            let len = list.len().unwrap();
            if len > 0 {
                list.remove(rng.gen_range(0..len), 1).unwrap();
            }
        }
        2 => {
            let map = doc.get_or_create_map("meta").unwrap();
            map.set(&format!("k{}", step % 7), f64::from(step)).unwrap();
        }
        _ => {
            let text = doc.get_or_create_text("body").unwrap();
            let len = text.len().unwrap();
            text.insert(rng.gen_range(0..=len), "a").unwrap();
        }
    }
}

fn soak(seed: u64, replicas: usize, steps: u32) {
    let mut net = TestConnector::with_seed(seed);
    for n in 0..replicas {
        net.create_replica(n as u64 + 1);
    }
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);

    for step in 0..steps {
        match rng.gen_range(0..10u8) {
            0 => {
                net.disconnect_random();
            }
            1 => {
                net.reconnect_random();
            }
            2 | 3 => {
                net.flush_random_message();
            }
            _ => {
                let id = rng.gen_range(0..replicas);
                let doc = doc_of(&net, id);
                random_edit(&mut rng, &doc, step);
            }
        }
    }
    net.assert_converged();
}

#[test]
fn randomized_two_replica_traffic_converges() {
    soak(0xC0FFEE, 2, 60);
}

#[test]
fn randomized_three_replica_traffic_converges() {
    soak(31, 3, 80);
}

#[test]
fn randomized_four_replica_traffic_converges() {
    soak(97, 4, 120);
}

#[test]
fn soaks_are_reproducible_for_a_fixed_seed() {
    let fingerprint = |seed: u64| {
        let mut net = TestConnector::with_seed(seed);
        let a = net.create_replica(1);
        net.create_replica(2);
        let mut rng = StdRng::seed_from_u64(seed);
        for step in 0..40 {
            if rng.gen_bool(0.5) {
                let doc = doc_of(&net, a);
                random_edit(&mut rng, &doc, step);
            } else {
                net.flush_random_message();
            }
        }
        net.assert_converged();
        doc_of(&net, a).encode_state_as_update()
    };
    assert_eq!(fingerprint(55), fingerprint(55));
}
