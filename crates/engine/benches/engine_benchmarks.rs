//! Benchmarks for the hot paths: line computation, settlement arithmetic,
//! and the full quote-to-receipt command chain.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

use mozfiscal_core::{ActorContext, SystemClock, TenantId, UserId};
use mozfiscal_documents::LineInput;
use mozfiscal_engine::{AcceptOutcome, EngineConfig, FiscalEngine};
use mozfiscal_escrow::PaymentMethod;
use mozfiscal_events::TracingPublisher;
use mozfiscal_tax::{document_totals, line_computation, Settlement};

fn bench_line_computation(c: &mut Criterion) {
    let lines: Vec<(Decimal, Decimal, Decimal, Decimal)> = (1..=50)
        .map(|i| {
            (
                Decimal::new(i * 137, 3),
                Decimal::new(i * 9_999, 2),
                Decimal::new((i % 20) * 100, 2),
                Decimal::from(16),
            )
        })
        .collect();

    c.bench_function("line_computation_50_lines", |b| {
        b.iter(|| {
            let computed: Vec<_> = lines
                .iter()
                .map(|(q, p, d, r)| line_computation(*q, *p, *d, *r))
                .collect();
            black_box(document_totals(computed.iter()))
        })
    });
}

fn bench_settlement(c: &mut Criterion) {
    c.bench_function("settlement_compute", |b| {
        b.iter(|| {
            black_box(Settlement::compute(
                black_box(Decimal::new(812_345, 2)),
                black_box(Decimal::new(790_000, 2)),
                black_box(Decimal::new(12_000, 2)),
            ))
        })
    });
}

fn bench_quote_to_receipt(c: &mut Criterion) {
    c.bench_function("quote_to_receipt_flow", |b| {
        let engine = FiscalEngine::new(TracingPublisher, SystemClock, EngineConfig::default());
        let ctx = ActorContext::new(TenantId::new(), UserId::new());
        let buyer = mozfiscal_core::CounterpartyId::new();

        b.iter(|| {
            let (quote_id, _) = engine
                .create_quote(
                    ctx,
                    buyer,
                    vec![LineInput {
                        item_id: None,
                        description: "Serviço".into(),
                        quantity: Decimal::from(10),
                        unit_price: Decimal::from(1000),
                        discount_pct: Decimal::ZERO,
                        tax_rate: Decimal::from(16),
                    }],
                    30,
                )
                .unwrap();
            let AcceptOutcome::Accepted { proforma_id, .. } =
                engine.accept_quote(ctx, quote_id, None, None).unwrap()
            else {
                unreachable!("plain accept");
            };
            let ids = engine
                .settle_payment(ctx, proforma_id, PaymentMethod::Cash, None)
                .unwrap();
            black_box(ids)
        })
    });
}

criterion_group!(
    benches,
    bench_line_computation,
    bench_settlement,
    bench_quote_to_receipt
);
criterion_main!(benches);
