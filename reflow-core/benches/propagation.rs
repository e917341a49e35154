//! Benchmarks for write propagation and incremental frames

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reflow_core::frame::{FrameDriver, RecordingRenderer};
use reflow_core::layout::MeasureCtx;
use reflow_core::reactive::{Computed, Runtime};
use reflow_core::{Constraints, InvalidationFlags, MeasureError, Point, Size, Widget};

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let rt = Runtime::new();
            let source = rt.create_signal(0_i64);
            let derived: Vec<Computed<i64>> = (0..width)
                .map(|i| rt.create_computed(move |rt| Ok(source.get(rt)? + i)))
                .collect();
            let _sink = rt
                .create_effect(move |rt| {
                    let mut sum = 0;
                    for computed in &derived {
                        sum += computed.get(rt)?;
                    }
                    black_box(sum);
                    Ok(())
                })
                .unwrap();

            let mut value = 0;
            b.iter(|| {
                value += 1;
                source.set(&rt, value).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for depth in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let rt = Runtime::new();
            let source = rt.create_signal(0_i64);
            let mut last = rt.create_computed(move |rt| source.get(rt));
            for _ in 0..depth {
                let prev = last;
                last = rt.create_computed(move |rt| Ok(prev.get(rt)? + 1));
            }
            let _sink = rt
                .create_effect(move |rt| {
                    black_box(last.get(rt)?);
                    Ok(())
                })
                .unwrap();

            let mut value = 0;
            b.iter(|| {
                value += 1;
                source.set(&rt, value).unwrap();
            });
        });
    }

    group.finish();
}

/// A fixed-height row whose width follows a shared cell.
struct Bar {
    width: Rc<Cell<f32>>,
}

impl Widget for Bar {
    fn measure(
        &mut self,
        _constraints: &Constraints,
        _ctx: &mut MeasureCtx<'_>,
    ) -> Result<Size, MeasureError> {
        Ok(Size::new(self.width.get(), 10.0))
    }
}

/// Stacks children vertically and fills the viewport.
struct List;

impl Widget for List {
    fn measure(
        &mut self,
        constraints: &Constraints,
        ctx: &mut MeasureCtx<'_>,
    ) -> Result<Size, MeasureError> {
        let mut y = 0.0;
        for child in ctx.children() {
            let size = ctx.measure_child(child, constraints.loosen())?;
            ctx.place_child(child, Point::new(0.0, y))?;
            y += size.height;
        }
        Ok(constraints.max)
    }
}

fn bench_incremental_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_frame");

    for rows in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("one_row_changed", rows), &rows, |b, &rows| {
            let mut driver = FrameDriver::new(Size::new(800.0, 10_000.0));
            let list = driver.insert_widget(None, List).unwrap();
            let mut width = None;
            for i in 0..rows {
                let cell = Rc::new(Cell::new(100.0));
                let bar = driver
                    .insert_widget(Some(list), Bar { width: cell.clone() })
                    .unwrap();
                if i == rows / 2 {
                    let signal = driver.runtime().create_signal(100.0_f32);
                    driver
                        .invalidate_on(bar, InvalidationFlags::LAYOUT, move |rt| {
                            cell.set(signal.get(rt)?);
                            Ok(())
                        })
                        .unwrap();
                    width = Some(signal);
                }
            }
            let Some(width) = width else { return };
            let mut renderer = RecordingRenderer::new();
            driver.run_frame(&mut renderer).unwrap();

            let mut value = 100.0;
            b.iter(|| {
                value = if value > 400.0 { 100.0 } else { value + 1.0 };
                driver.queue_set(width, value);
                renderer.frames.clear();
                black_box(driver.run_frame(&mut renderer).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_chain, bench_incremental_frame);
criterion_main!(benches);
