//! Owning buffers are counted while they hold an allocation; views are not.
//!
//! Kept as the only test in this binary so the process-wide counter is not
//! disturbed by tests running on other threads.

use lightmem_core::{
    Context, ElementType, Matrix, Memory, MemoryMut, MemorySpace, Tensor, Vector, live_buffers,
};

#[test]
fn live_buffer_counter_tracks_owners() {
    let _ = tracing_subscriber::fmt::try_init();
    let ctx = Context::cpu();
    let base = live_buffers();

    let mut m = Matrix::new(&ctx, 4, 3, MemorySpace::Device, ElementType::Float32).unwrap();
    let t = Tensor::new(&ctx, 2, 2, 2, MemorySpace::Host, ElementType::Int32).unwrap();
    assert_eq!(live_buffers(), base + 2);

    {
        let mut col = m.column_mut(1).unwrap();
        col.set(1.0).unwrap();
        let _cube = t.cube(1).unwrap();
        assert_eq!(live_buffers(), base + 2);
    }

    // Staging buffers for device reads come and go.
    assert_eq!(m.get_column::<f32>(1).unwrap(), vec![1.0; 4]);
    assert_eq!(live_buffers(), base + 2);

    m.dispose().unwrap();
    m.dispose().unwrap();
    assert_eq!(live_buffers(), base + 1);

    drop(t);
    assert_eq!(live_buffers(), base);

    let empty = Vector::new(&ctx, 0, MemorySpace::Device, ElementType::Float64).unwrap();
    assert!(empty.is_empty());
    assert_eq!(live_buffers(), base);
    assert_eq!(ctx.live_allocations(), 0);
}
