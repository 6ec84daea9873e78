//! Error taxonomy and argument validation: synchronous rejections, backend
//! errors broadcast uniformly, and lifecycle ordering rules.

use std::sync::Arc;

use smio_backend_mem::MemBackend;
use smio_comm_shmem::run_ranks;
use smio_core::{
    Context, Decomp, File, FileMode, Offset, SmioError, VarType, error_string,
};

fn one_rank<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: Fn(Arc<dyn smio_core::Communicator>, Arc<MemBackend>) -> T + Send + Sync + 'static,
{
    let backend = Arc::new(MemBackend::new());
    run_ranks(1, move |_rank, comm| f(comm, backend.clone()))
        .pop()
        .unwrap()
}

#[test]
fn conflicting_mode_flags_rejected() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let err = File::open(&ctx, "f", FileMode::CREATE | FileMode::READ).unwrap_err();
        assert_eq!(err, SmioError::InvalidArgument);
        let err = File::open(&ctx, "f", FileMode::empty()).unwrap_err();
        assert_eq!(err, SmioError::InvalidArgument);
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn open_missing_file_is_backend_error() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let err = File::open(&ctx, "never-created", FileMode::READ).unwrap_err();
        assert!(matches!(err, SmioError::Library { .. }));
        assert!(!error_string(&err).is_empty());
        assert!(!ctx.lib_error_string().is_empty());
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn zero_sized_dimension_rejected() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let mut file = File::open(&ctx, "dims", FileMode::CREATE).unwrap();
        assert_eq!(file.define_dim("bad", 0).unwrap_err(), SmioError::InvalidArgument);
        file.define_dim("ok", 3).unwrap();
        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn unknown_variable_is_backend_error() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let mut file = File::open(&ctx, "vars", FileMode::CREATE).unwrap();
        let err = file.put_var("ghost", None, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, SmioError::Library { .. }));
        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn unknown_var_type_rejected() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let mut file = File::open(&ctx, "types", FileMode::CREATE).unwrap();
        assert_eq!(
            file.define_var("v", VarType::Unknown, &[]).unwrap_err(),
            SmioError::InvalidArgument
        );
        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn short_buffers_are_insufficient() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let mut file = File::open(&ctx, "short", FileMode::CREATE).unwrap();
        file.define_dim("n", 4).unwrap();
        file.define_var("v", VarType::Int32, &["n"]).unwrap();

        assert_eq!(
            file.put_var("v", None, &[0u8; 2]).unwrap_err(),
            SmioError::InsufficientArg
        );

        file.put_var("v", None, &[0u8; 16]).unwrap();
        file.sync().unwrap();
        let mut small = [0u8; 2];
        assert_eq!(
            file.get_var("v", None, &mut small).unwrap_err(),
            SmioError::InsufficientArg
        );

        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn writes_to_read_only_file_rejected() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let mut file = File::open(&ctx, "ro", FileMode::CREATE).unwrap();
        file.define_var("v", VarType::Int32, &[]).unwrap();
        file.put_var("v", None, &[0u8; 4]).unwrap();
        file.sync().unwrap();
        file.close().unwrap();

        let mut file = File::open(&ctx, "ro", FileMode::READ).unwrap();
        assert_eq!(
            file.put_var("v", None, &[0u8; 4]).unwrap_err(),
            SmioError::InvalidArgument
        );
        let mut out = [0u8; 4];
        file.get_var("v", None, &mut out).unwrap();
        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn finalize_with_open_handles_fails() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let file = File::open(&ctx, "held", FileMode::CREATE).unwrap();

        // The open file still references the context
        let err = Context::finalize(Arc::clone(&ctx)).unwrap_err();
        assert_eq!(err, SmioError::InvalidArgument);

        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn bad_layouts_rejected_at_init() {
    one_rank(|comm, backend| {
        // More I/O tasks than ranks
        assert_eq!(
            Context::init(comm.clone(), backend.clone(), 2, 1).unwrap_err(),
            SmioError::InvalidArgument
        );
        // Zero I/O tasks
        assert_eq!(
            Context::init(comm.clone(), backend.clone(), 0, 1).unwrap_err(),
            SmioError::InvalidArgument
        );
        // A stride group without an I/O task would have no broadcast root;
        // a single rank at stride 1 is the only valid single-task layout
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn duplicate_and_out_of_range_ids_rejected() {
    one_rank(|comm, backend| {
        let ctx = Context::init(comm, backend, 1, 1).unwrap();
        let dup: Vec<Offset> = vec![0, 0];
        assert_eq!(
            Decomp::create(&ctx, &dup, 1).unwrap_err(),
            SmioError::InvalidArgument
        );
        // Global count is 2, so id 5 falls outside the index space
        let oob: Vec<Offset> = vec![5, 1];
        assert_eq!(
            Decomp::create(&ctx, &oob, 1).unwrap_err(),
            SmioError::InvalidArgument
        );
        Context::finalize(ctx).unwrap();
    });
}

#[test]
fn every_error_kind_has_a_string() {
    let kinds = [
        SmioError::AllocFailure,
        SmioError::InvalidArgument,
        SmioError::Messaging(smio_core::CommError::new("bcast")),
        SmioError::ForeignBinding,
        SmioError::Library { code: -4 },
        SmioError::WrongArgType,
        SmioError::InsufficientArg,
        SmioError::Async,
    ];
    for k in &kinds {
        assert!(!error_string(k).is_empty());
    }
}
