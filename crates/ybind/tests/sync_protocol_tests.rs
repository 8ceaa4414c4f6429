use std::cell::RefCell;
use std::rc::Rc;

use ybind::yrs::Any;
use ybind::{
    decode_sync_message, encode_sync_step1, encode_sync_step2, encode_sync_update, DocError,
    Document, EngineError, Origin, SyncMessage, SyncProtocol,
};

#[test]
fn sync_messages_round_trip_through_the_framing() {
    let payload = vec![1, 2, 3, 250];
    assert_eq!(
        decode_sync_message(&encode_sync_step1(&payload)).unwrap(),
        SyncMessage::Step1(payload.clone())
    );
    assert_eq!(
        decode_sync_message(&encode_sync_step2(&payload)).unwrap(),
        SyncMessage::Step2(payload.clone())
    );
    assert_eq!(
        decode_sync_message(&encode_sync_update(&payload)).unwrap(),
        SyncMessage::Update(payload)
    );
}

#[test]
fn unknown_message_tags_are_rejected() {
    let err = decode_sync_message(&[7, 0]).unwrap_err();
    assert!(matches!(err, EngineError::UnknownSyncTag(7)));

    let doc = Document::new();
    let protocol = SyncProtocol::new(doc);
    let err = protocol.apply_sync_step(&[7, 0]).unwrap_err();
    assert!(matches!(
        err,
        DocError::Engine(EngineError::UnknownSyncTag(7))
    ));
}

#[test]
fn truncated_messages_are_rejected() {
    assert!(decode_sync_message(&[]).is_err());
    assert!(decode_sync_message(&[0]).is_err());
    assert!(decode_sync_message(&[0, 5, 1]).is_err());
}

#[test]
fn step1_answers_with_the_missing_update() {
    let source = Document::new();
    let list = source.get_or_create_array("todo").unwrap();
    list.push_back("a").unwrap();
    list.push_back("b").unwrap();
    let source_protocol = SyncProtocol::new(source);

    let sink = Document::new();
    let sink_protocol = SyncProtocol::new(sink);

    let step1 = sink_protocol.start_sync();
    let step2 = source_protocol
        .apply_sync_step(&step1)
        .unwrap()
        .expect("step 1 must be answered");
    assert!(sink_protocol.apply_sync_step(&step2).unwrap().is_none());

    assert_eq!(
        sink_protocol
            .doc()
            .get_or_create_array("todo")
            .unwrap()
            .to_json()
            .unwrap(),
        Any::Array(vec![Any::String("a".into()), Any::String("b".into())].into())
    );
}

#[test]
fn update_messages_merge_without_a_reply() {
    let source = Document::new();
    let log: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    source.on_update(move |update, _| sink.borrow_mut().push(update.to_vec()));
    let list = source.get_or_create_array("todo").unwrap();
    list.push_back(1.0).unwrap();

    let receiver = Document::new();
    let protocol = SyncProtocol::new(receiver);
    let message = encode_sync_update(&log.borrow()[0]);
    assert!(protocol.apply_sync_step(&message).unwrap().is_none());
    assert_eq!(
        protocol
            .doc()
            .get_or_create_array("todo")
            .unwrap()
            .len()
            .unwrap(),
        1
    );
}

#[test]
fn inbound_messages_broadcast_with_the_handler_origin() {
    let source = Document::new();
    let list = source.get_or_create_array("todo").unwrap();
    list.push_back("x").unwrap();
    let update = source.encode_state_as_update();

    let receiver = Document::new();
    // Prime the baseline so the inbound merge is observable.
    receiver.trigger_diff(None);
    let origins: Rc<RefCell<Vec<Origin>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&origins);
    receiver.on_update(move |_, origin| sink.borrow_mut().push(origin));

    let protocol = SyncProtocol::with_origin(receiver, Origin::Connector(9));
    protocol
        .apply_sync_step(&encode_sync_update(&update))
        .unwrap();
    assert_eq!(origins.borrow().as_slice(), &[Origin::Connector(9)]);
}

#[test]
fn malformed_update_payloads_fail_but_still_broadcast_nothing() {
    let doc = Document::new();
    doc.trigger_diff(None);
    let count = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&count);
    doc.on_update(move |_, _| *sink.borrow_mut() += 1);

    let protocol = SyncProtocol::new(doc);
    let garbage = encode_sync_update(&[0xff, 0xff, 0xff]);
    assert!(protocol.apply_sync_step(&garbage).is_err());
    assert_eq!(*count.borrow(), 0);
}
