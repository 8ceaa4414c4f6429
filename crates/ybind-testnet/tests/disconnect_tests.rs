use ybind::yrs::Any;
use ybind::Document;
use ybind_testnet::TestConnector;

fn doc_of(net: &TestConnector, id: usize) -> Document {
    net.replica(id).doc().clone()
}

#[test]
fn offline_replicas_receive_nothing_until_reconnect() {
    let mut net = TestConnector::with_seed(3);
    let a = net.create_replica(1);
    let b = net.create_replica(2);
    net.flush_all_messages();

    net.disconnect(b);
    assert!(!net.is_online(b));
    let list = doc_of(&net, a).get_or_create_array("todo").unwrap();
    list.push_back("while b was away").unwrap();
    net.flush_all_messages();
    assert_eq!(
        doc_of(&net, b).get_or_create_array("todo").unwrap().len().unwrap(),
        0
    );

    net.connect(b);
    net.flush_all_messages();
    assert_eq!(
        doc_of(&net, b).get_or_create_array("todo").unwrap().len().unwrap(),
        1
    );
    net.assert_converged();
}

#[test]
fn disconnect_drops_queued_messages_for_the_replica() {
    let mut net = TestConnector::with_seed(5);
    let a = net.create_replica(1);
    let b = net.create_replica(2);
    net.flush_all_messages();

    let list = doc_of(&net, a).get_or_create_array("todo").unwrap();
    list.push_back("queued").unwrap();
    // The update sits in b's inbox; dropping the connection loses it and
    // the reconnect handshake recovers it instead.
    net.disconnect(b);
    net.connect(b);
    net.flush_all_messages();
    assert_eq!(
        doc_of(&net, b).get_or_create_array("todo").unwrap().len().unwrap(),
        1
    );
    net.assert_converged();
}

#[test]
fn offline_edits_on_both_sides_merge_after_reconnect() {
    let mut net = TestConnector::with_seed(8);
    let a = net.create_replica(1);
    let b = net.create_replica(2);
    net.flush_all_messages();

    net.disconnect(a);
    net.disconnect(b);
    doc_of(&net, a)
        .get_or_create_map("meta")
        .unwrap()
        .set("from_a", 1.0)
        .unwrap();
    doc_of(&net, b)
        .get_or_create_map("meta")
        .unwrap()
        .set("from_b", 2.0)
        .unwrap();

    net.assert_converged();
    let meta = doc_of(&net, a).get_or_create_map("meta").unwrap();
    assert_eq!(meta.len().unwrap(), 2);
    assert_eq!(
        meta.get("from_b").unwrap().unwrap().to_json().unwrap(),
        Any::Number(2.0)
    );
}

#[test]
fn deletions_made_offline_propagate_on_reconnect() {
    let mut net = TestConnector::with_seed(13);
    let a = net.create_replica(1);
    let b = net.create_replica(2);
    let list = doc_of(&net, a).get_or_create_array("todo").unwrap();
    for n in 0..4 {
        list.push_back(f64::from(n)).unwrap();
    }
    net.flush_all_messages();
    assert_eq!(
        doc_of(&net, b).get_or_create_array("todo").unwrap().len().unwrap(),
        4
    );

    net.disconnect(a);
    list.remove(1, 2).unwrap();
    net.assert_converged();
    assert_eq!(
        doc_of(&net, b)
            .get_or_create_array("todo")
            .unwrap()
            .to_json()
            .unwrap(),
        Any::Array(vec![Any::Number(0.0), Any::Number(3.0)].into())
    );
}

#[test]
fn emptying_an_array_offline_empties_it_everywhere() {
    let mut net = TestConnector::with_seed(17);
    let a = net.create_replica(1);
    let b = net.create_replica(2);
    let c = net.create_replica(3);

    let list = doc_of(&net, a).get_or_create_array("array").unwrap();
    list.push_back("x").unwrap();
    list.push_back("y").unwrap();
    list.push_back("z").unwrap();
    net.flush_all_messages();

    net.disconnect(a);
    list.remove(0, 3).unwrap();
    net.connect(a);
    net.flush_all_messages();

    for id in [a, b, c] {
        assert_eq!(
            doc_of(&net, id)
                .get_or_create_array("array")
                .unwrap()
                .to_json()
                .unwrap(),
            Any::Array(Vec::new().into()),
            "replica {id} still renders deleted elements"
        );
    }
    net.assert_converged();
}

#[test]
fn three_replicas_converge_after_offline_deletions() {
    let mut net = TestConnector::with_seed(21);
    let a = net.create_replica(1);
    let b = net.create_replica(2);
    let c = net.create_replica(3);

    let list = doc_of(&net, a).get_or_create_array("todo").unwrap();
    for n in 0..6 {
        list.push_back(f64::from(n)).unwrap();
    }
    net.flush_all_messages();

    // Two replicas go dark and delete overlapping ranges; the third keeps
    // editing.
    net.disconnect(b);
    net.disconnect(c);
    doc_of(&net, b)
        .get_or_create_array("todo")
        .unwrap()
        .remove(0, 2)
        .unwrap();
    doc_of(&net, c)
        .get_or_create_array("todo")
        .unwrap()
        .remove(1, 3)
        .unwrap();
    list.push_back(6.0).unwrap();

    net.assert_converged();
    let views: Vec<_> = [a, b, c]
        .iter()
        .map(|&id| {
            doc_of(&net, id)
                .get_or_create_array("todo")
                .unwrap()
                .to_json()
                .unwrap()
        })
        .collect();
    assert_eq!(views[0], views[1]);
    assert_eq!(views[1], views[2]);
}

#[test]
fn disconnecting_twice_is_a_no_op() {
    let mut net = TestConnector::with_seed(1);
    let a = net.create_replica(1);
    net.disconnect(a);
    net.disconnect(a);
    assert!(!net.is_online(a));
    net.connect(a);
    net.connect(a);
    assert!(net.is_online(a));
    net.assert_converged();
}
