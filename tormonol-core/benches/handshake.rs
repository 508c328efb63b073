use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tormonol_core::config::HandshakeConfig;
use tormonol_core::core_crypto::SigningIdentity;
use tormonol_core::core_handshake::InitiatorHandshake;
use tormonol_core::HandshakeCoordinator;

fn bench_full_handshake(c: &mut Criterion) {
    let identity = SigningIdentity::generate();
    let coordinator = HandshakeCoordinator::new(identity.trust_anchor(), &HandshakeConfig::default());
    let initiator = InitiatorHandshake::new(identity);

    c.bench_function("handshake_in_process", |b| {
        b.iter(|| {
            let nonce = coordinator.challenge();
            let ticket = coordinator.ticket(&initiator.ticket_body(&nonce).unwrap()).unwrap();
            let pending = initiator.accept_ticket(&ticket).unwrap();
            let salt = coordinator.salt(pending.salt_body()).unwrap();
            let admission = pending.accept_salt(&salt).unwrap();
            black_box(coordinator.admit(&admission.id, &admission.token).unwrap())
        });
    });
}

fn bench_verify(c: &mut Criterion) {
    let identity = SigningIdentity::generate();
    let anchor = identity.trust_anchor();
    let token = "AAECAwQFBgc=";
    let signature = identity.sign_token(token).unwrap();

    c.bench_function("verify_token", |b| {
        b.iter(|| black_box(anchor.verify_token(black_box(token), &signature).unwrap()));
    });
}

criterion_group!(benches, bench_full_handshake, bench_verify);
criterion_main!(benches);
