//! Xinos kernel - bare-metal entry point.
//!
//! `_start` (arch/riscv64/entry.rs) sets up `gp`, the boot stack and `.bss`,
//! then calls [`kernel_main`] on hart 0 in machine mode. The boot context
//! becomes the idle task once the scheduler is up.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use core::ptr::addr_of;

use heapless::spsc::Queue;
use xinos_kernel::arch::{clint, cpu, plic, uart, UART0_IRQ};
use xinos_kernel::scheduler::{self, TaskEntry};
use xinos_kernel::sync::{SpinLock, WaitQueue};
use xinos_kernel::syscall::user::{sys_sleep, sys_task_id, sys_ticks, sys_write};
use xinos_kernel::{config, logging, memory, println, trap};

extern "C" {
    static __heap_start: u8;
    static __heap_end: u8;
}

/// Sleep period of the demo sleepers, in ticks.
const SLEEP_TICKS: u64 = 1000;

/// Demo sleeper tasks: label and priority.
const SLEEPERS: [(u8, u16); 3] = [(b'A', 100), (b'B', 105), (b'C', 110)];

const ECHO_PRIORITY: u16 = 50;

static RX_QUEUE: SpinLock<Queue<u8, 64>> = SpinLock::new(Queue::new());
static RX_WAIT: WaitQueue = WaitQueue::new();

#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    let config = config::get();

    uart::init();
    logging::init(config.log_level);
    println!("Xinos kernel starting on hart {}", cpu::hart_id());

    // SAFETY: the linker script places the heap between these symbols, after
    // every loaded section and the boot stack.
    unsafe {
        let heap_start = addr_of!(__heap_start) as usize;
        let heap_end = addr_of!(__heap_end) as usize;
        memory::init(heap_start, heap_end - heap_start, config.trace_allocations);
    }
    log::info!("{} pages free", memory::free_page_count());

    trap::init();

    plic::set_priority(UART0_IRQ, 1);
    plic::set_threshold(0);
    plic::enable_source(UART0_IRQ);
    trap::register_irq_handler(UART0_IRQ, uart_irq);

    scheduler::init();
    spawn_demo_tasks();

    clint::program_next_tick(config.tick_interval);
    cpu::enable_interrupts();
    log::info!("scheduler running");

    loop {
        cpu::wait_for_interrupt();
    }
}

fn spawn_demo_tasks() {
    let config = config::get();

    for (label, priority) in SLEEPERS {
        spawn_or_warn(sleeper_task, label as usize, priority, config.default_timeslice);
    }
    spawn_or_warn(echo_task, 0, ECHO_PRIORITY, config.default_timeslice);

    if let Err(err) = scheduler::timer_create(Some(print_uptime), 0, config.ticks_per_second) {
        log::warn!("uptime timer: {}", err);
    }
}

fn spawn_or_warn(entry: TaskEntry, arg: usize, priority: u16, timeslice: u64) {
    if let Err(err) = scheduler::task_create(entry, arg, priority, timeslice) {
        log::warn!("failed to spawn demo task: {}", err);
    }
}

extern "C" fn sleeper_task(label: usize) {
    let label = label as u8 as char;
    loop {
        let id = sys_task_id().unwrap_or(usize::MAX);
        let ticks = sys_ticks().unwrap_or(0);
        println!("[{}] task {} awake at tick {}", label, id, ticks);

        if let Err(err) = sys_sleep(SLEEP_TICKS) {
            log::warn!("[{}] sleep failed: {:?}", label, err);
        }
    }
}

/// Echoes every byte received on the UART.
extern "C" fn echo_task(_arg: usize) {
    loop {
        RX_WAIT.wait_if(|| RX_QUEUE.lock().is_empty());

        loop {
            let Some(byte) = RX_QUEUE.lock().dequeue() else {
                break;
            };
            let echoed = if byte == b'\r' { b'\n' } else { byte };
            let _ = sys_write(&[echoed]);
        }
    }
}

/// Re-arms itself every second.
fn print_uptime(_arg: usize) {
    println!("uptime {}", scheduler::uptime());

    let ticks_per_second = config::get().ticks_per_second;
    if let Err(err) = scheduler::timer_create(Some(print_uptime), 0, ticks_per_second) {
        log::warn!("uptime timer: {}", err);
    }
}

fn uart_irq(_source: u32) {
    {
        let mut queue = RX_QUEUE.lock();
        while let Some(byte) = uart::get_byte() {
            if queue.enqueue(byte).is_err() {
                break;
            }
        }
    }
    RX_WAIT.wake_all();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    xinos_kernel::panic::report(info)
}
